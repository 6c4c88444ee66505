//! Cluster-membership interface assumed by the ConfigurationUpdateManager
//! (spec §6 "Cluster"). The concrete membership library is an external
//! collaborator; this crate only needs "am I master?" and a replicated
//! set of Configurations — the only type this system ever publishes to
//! it. When clustering is disabled every node is master and the set is
//! process-local (spec §6, §8 scenario 6).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::Configuration;

/// A replicated set of Configurations, as seen from one node.
#[async_trait]
pub trait ReplicatedSet: Send + Sync {
    async fn put(&self, values: HashSet<Configuration>);
    async fn get(&self) -> HashSet<Configuration>;
}

/// Cluster membership: "am I master?" plus the named replicated
/// Configuration set (spec §4.8 step 3).
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn is_master(&self) -> bool;

    /// Returns the replicated set named `name`, creating it on first
    /// request. Distinct names never share storage.
    fn replicated_set(&self, name: &str) -> Arc<dyn ReplicatedSet>;
}

struct LocalSet {
    values: RwLock<HashSet<Configuration>>,
}

#[async_trait]
impl ReplicatedSet for LocalSet {
    async fn put(&self, values: HashSet<Configuration>) {
        *self.values.write() = values;
    }

    async fn get(&self) -> HashSet<Configuration> {
        self.values.read().clone()
    }
}

/// Degenerate single-node cluster used when `hazelcast.enabled = false`
/// (spec §6): every node is master, and the "replicated" set is simply
/// held in process memory, keyed by set name.
#[derive(Default)]
pub struct LocalCluster {
    sets: dashmap::DashMap<String, Arc<LocalSet>>,
}

impl LocalCluster {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn is_master(&self) -> bool {
        true
    }

    fn replicated_set(&self, name: &str) -> Arc<dyn ReplicatedSet> {
        self.sets
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(LocalSet {
                    values: RwLock::new(HashSet::new()),
                })
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(repeat: i64) -> Configuration {
        Configuration {
            extracts: vec![],
            transforms: vec![],
            loads: vec![],
            repeat_interval_millis: repeat,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn local_cluster_is_always_master() {
        let cluster = LocalCluster::new();
        assert!(cluster.is_master().await);
    }

    #[tokio::test]
    async fn replicated_set_round_trips() {
        let cluster = LocalCluster::new();
        let set = cluster.replicated_set("configurations");
        let mut values = HashSet::new();
        values.insert(config(1000));
        values.insert(config(2000));
        set.put(values.clone()).await;
        assert_eq!(set.get().await, values);
    }

    #[tokio::test]
    async fn distinct_names_do_not_share_storage() {
        let cluster = LocalCluster::new();
        let a = cluster.replicated_set("a");
        let b = cluster.replicated_set("b");
        let mut values = HashSet::new();
        values.insert(config(1000));
        a.put(values).await;
        assert!(b.get().await.is_empty());
    }
}

//! `ConfigurationUpdateManager` (spec §4.8): periodic, cluster-coordinated
//! reloader that diffs the latest Configuration set against the currently
//! scheduled one and drives the `TaskScheduler` accordingly.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;

use crate::cluster::Cluster;
use crate::error::ConfigError;
use crate::model::Configuration;
use crate::scheduler::TaskScheduler;

const REPLICATED_SET_NAME: &str = "configurations";

/// Pluggable Configuration source (spec §6 "Configuration source").
#[async_trait]
pub trait ConfigurationLoader: Send + Sync {
    async fn load(&self) -> Result<HashSet<Configuration>, ConfigError>;
}

/// Coordinates the active Configuration set with the Scheduler (spec
/// §4.8). State machine per Configuration: `Unknown -> Scheduled ->
/// (Running <-> Idle)* -> Cancelled -> Removed`; this struct owns the
/// `Unknown/Scheduled/Removed` transitions, the Scheduler owns the rest.
pub struct UpdateManager {
    cluster: Arc<dyn Cluster>,
    loader: Arc<dyn ConfigurationLoader>,
    scheduler: Arc<TaskScheduler>,
    scheduled: RwLock<HashSet<Configuration>>,
}

impl UpdateManager {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        loader: Arc<dyn ConfigurationLoader>,
        scheduler: Arc<TaskScheduler>,
    ) -> Self {
        Self {
            cluster,
            loader,
            scheduler,
            scheduled: RwLock::new(HashSet::new()),
        }
    }

    /// Runs one reload tick (spec §4.8). A non-master node does nothing:
    /// it neither calls the loader nor touches the scheduler (spec §8
    /// scenario 6); it is expected to observe the active set through the
    /// replicated set via whatever external path the cluster membership
    /// library offers, outside this manager's scope.
    pub async fn run(&self) {
        if !self.cluster.is_master().await {
            return;
        }

        let latest = match self.loader.load().await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "configuration reload failed, keeping the current active set");
                return;
            }
        };

        self.cluster
            .replicated_set(REPLICATED_SET_NAME)
            .put(latest.clone())
            .await;

        self.apply_diff(latest);
    }

    fn apply_diff(&self, latest: HashSet<Configuration>) {
        let mut scheduled = self.scheduled.write();

        let added: Vec<Configuration> = latest.difference(&scheduled).cloned().collect();
        let removed: Vec<Configuration> = scheduled.difference(&latest).cloned().collect();

        for configuration in removed {
            self.scheduler.cancel(configuration.identity());
        }
        for configuration in added {
            self.scheduler.schedule(configuration);
        }

        *scheduled = latest;
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_connectors::AppConnectors;
    use crate::clock::ShutdownSignal;
    use crate::cluster::{Cluster, LocalCluster, ReplicatedSet};
    use crate::connector::ConnectorRegistry;
    use crate::extract::RefocusSample;
    use crate::pipeline::Pipeline;
    use crate::status::SystemStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(repeat: i64) -> Configuration {
        Configuration {
            extracts: vec![],
            transforms: vec![],
            loads: vec![],
            repeat_interval_millis: repeat,
            disabled: false,
        }
    }

    fn scheduler() -> Arc<TaskScheduler> {
        let pipeline = Pipeline::new(
            Arc::new(AppConnectors::<RefocusSample>::new(ConnectorRegistry::new(vec![]))),
            ShutdownSignal::new(),
            SystemStatus::new(),
        );
        Arc::new(TaskScheduler::new(pipeline, ShutdownSignal::new(), 4))
    }

    struct CountingLoader {
        calls: AtomicUsize,
        configurations: HashSet<Configuration>,
    }

    #[async_trait]
    impl ConfigurationLoader for CountingLoader {
        async fn load(&self) -> Result<HashSet<Configuration>, ConfigError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.configurations.clone())
        }
    }

    /// Wraps a shared `LocalCluster` but reports a fixed master/slave
    /// role, so two `UpdateManager`s can be tested against one node's
    /// view of cluster membership while sharing replicated-set storage.
    struct FixedRoleCluster {
        inner: Arc<LocalCluster>,
        master: bool,
    }

    #[async_trait]
    impl Cluster for FixedRoleCluster {
        async fn is_master(&self) -> bool {
            self.master
        }

        fn replicated_set(&self, name: &str) -> Arc<dyn ReplicatedSet> {
            self.inner.replicated_set(name)
        }
    }

    #[tokio::test]
    async fn master_loads_schedules_and_publishes() {
        let mut configs = HashSet::new();
        configs.insert(config(1000));
        configs.insert(config(2000));

        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            configurations: configs.clone(),
        });
        let cluster: Arc<dyn Cluster> = Arc::new(LocalCluster::new());
        let scheduler = scheduler();
        let manager = UpdateManager::new(cluster.clone(), loader.clone(), scheduler.clone());

        manager.run().await;

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.scheduled_count(), 2);
        assert_eq!(scheduler.scheduled_count(), 2);
        assert_eq!(
            cluster.replicated_set(REPLICATED_SET_NAME).get().await,
            configs
        );
    }

    #[tokio::test]
    async fn removed_configurations_are_cancelled_and_added_ones_scheduled() {
        let keep = config(1000);
        let remove_me = config(2000);
        let add_me = config(3000);

        let mut first_tick = HashSet::new();
        first_tick.insert(keep.clone());
        first_tick.insert(remove_me.clone());

        let loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            configurations: first_tick,
        });
        let scheduler = scheduler();
        let manager = UpdateManager::new(
            Arc::new(LocalCluster::new()),
            loader.clone(),
            scheduler.clone(),
        );
        manager.run().await;
        assert_eq!(scheduler.scheduled_count(), 2);

        let mut second_tick = HashSet::new();
        second_tick.insert(keep.clone());
        second_tick.insert(add_me.clone());

        // Swap the loader's view by constructing a fresh manager sharing
        // the same scheduler, simulating the next reload tick observing
        // an updated source set.
        let loader2 = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            configurations: second_tick,
        });
        let manager2 = UpdateManager::new(Arc::new(LocalCluster::new()), loader2, scheduler.clone());
        // Seed manager2's view of "currently scheduled" to match reality.
        {
            let mut scheduled = manager2.scheduled.write();
            scheduled.insert(keep.clone());
            scheduled.insert(remove_me.clone());
        }
        manager2.run().await;

        assert!(!scheduler.is_scheduled(remove_me.identity()));
        assert!(scheduler.is_scheduled(keep.identity()));
        assert!(scheduler.is_scheduled(add_me.identity()));
    }

    #[tokio::test]
    async fn slave_never_invokes_the_loader_but_observes_the_replicated_set() {
        let mut configs = HashSet::new();
        configs.insert(config(1000));

        let shared_storage = Arc::new(LocalCluster::new());
        let master_cluster: Arc<dyn Cluster> = Arc::new(FixedRoleCluster {
            inner: shared_storage.clone(),
            master: true,
        });
        let slave_cluster: Arc<dyn Cluster> = Arc::new(FixedRoleCluster {
            inner: shared_storage.clone(),
            master: false,
        });

        let master_loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            configurations: configs.clone(),
        });
        let slave_loader = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
            configurations: HashSet::new(),
        });

        let master = UpdateManager::new(master_cluster, master_loader.clone(), scheduler());
        let slave = UpdateManager::new(slave_cluster.clone(), slave_loader.clone(), scheduler());

        master.run().await;
        slave.run().await;

        assert_eq!(master_loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(slave_loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            slave_cluster.replicated_set(REPLICATED_SET_NAME).get().await,
            configs
        );
    }
}

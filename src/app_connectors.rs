//! `AppConnectors`: per-`(endpointId, serviceClass)` client+cache factory
//! with memoization (spec §2.6, §4.3).

use std::sync::Arc;

use dashmap::DashMap;

use crate::cache::{Cache, CacheKeyed};
use crate::connector::ConnectorRegistry;
use crate::error::{ConfigError, InternalError, PipelineError};
use crate::remote_client::RemoteClient;

/// Builds and memoizes `(RemoteClient, Cache<T>)` pairs keyed by
/// `(endpointId, serviceClass)`. The same tuple always returns the same
/// pair for the lifetime of the process (spec §4.3); the pair is shared
/// across every concurrent pipeline touching that endpoint.
///
/// Parameterized over the sample type `T` cached by the service class this
/// instance serves — in this crate, Refocus's `Sample` (see
/// `extract::refocus`).
pub struct AppConnectors<T: CacheKeyed + Clone + Send + Sync + 'static> {
    registry: ConnectorRegistry,
    entries: DashMap<(String, String), (Arc<RemoteClient>, Cache<T>)>,
}

impl<T: CacheKeyed + Clone + Send + Sync + 'static> AppConnectors<T> {
    pub fn new(registry: ConnectorRegistry) -> Self {
        Self {
            registry,
            entries: DashMap::new(),
        }
    }

    /// Returns the memoized client/cache pair for `(endpoint_id,
    /// service_class)`, constructing it on first request from the
    /// connector registry entry for `endpoint_id`. A missing connector
    /// means the registry and the configuration that named `endpoint_id`
    /// have drifted apart, which is an [`InternalError`] invariant
    /// violation rather than ordinary bad input (spec §4.3, §7).
    pub fn client_and_cache_for(
        &self,
        endpoint_id: &str,
        service_class: &str,
    ) -> Result<(Arc<RemoteClient>, Cache<T>), PipelineError> {
        let key = (endpoint_id.to_string(), service_class.to_string());

        if let Some(existing) = self.entries.get(&key) {
            return Ok(existing.clone());
        }

        let connector = self.registry.get(endpoint_id).map_err(|_| {
            InternalError::InvariantViolated(format!(
                "AppConnectors has no registered connector for known endpointId {endpoint_id}"
            ))
        })?.clone();
        let client = Arc::new(RemoteClient::new(endpoint_id, connector).map_err(|e| {
            PipelineError::Config(ConfigError::Invalid {
                reason: format!("failed to build remote client for {endpoint_id}: {e}"),
            })
        })?);
        let cache = Cache::new();

        // `entry().or_insert_with` is atomic: under a concurrent
        // first-access race, only one candidate is ever stored and every
        // caller observes the same pair (spec §9 "Shared mutable state").
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| (client, cache));
        Ok(entry.clone())
    }
}

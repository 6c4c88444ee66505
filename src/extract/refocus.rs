//! `RefocusExtractProcessor` (spec §4.4): fans out a flat Extract list
//! across endpoints in parallel, resolving each Extract to at most one
//! `Transmutation` via cache-then-remote, with default-value synthesis
//! and full metering.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_connectors::AppConnectors;
use crate::cache::{Cache, CacheKeyed};
use crate::clock::{Clock, ShutdownSignal, SystemClock};
use crate::error::DataError;
use crate::model::{Extract, Matrix, Transmutation};
use crate::remote_client::RemoteClient;
use crate::status::{MeterKind, SystemStatus};

const METER_NAME: &str = "refocus_extract";
const SERVICE_CLASS: &str = "refocus";
const TIMEOUT_SENTINEL: &str = "Timeout";

/// Raw measurement as returned by the Refocus remote (spec §3, §4.4).
/// `value` and `updated_at` are kept as the wire's raw strings; parsing
/// (and distinguishing a parse failure from the `"Timeout"` sentinel)
/// happens in [`create_result`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefocusSample {
    pub name: String,
    pub value: String,
    pub updated_at: String,
}

impl CacheKeyed for RefocusSample {
    fn cache_key(&self) -> String {
        self.name.clone()
    }
}

/// Extracts a Matrix from a flat list of Extracts, partitioned by
/// endpoint and resolved in parallel across endpoints (spec §4.4).
pub async fn extract(
    extracts: &[Extract],
    connectors: &AppConnectors<RefocusSample>,
    shutdown: &ShutdownSignal,
    status: &SystemStatus,
) -> Matrix {
    extract_with_clock(extracts, connectors, shutdown, status, &SystemClock).await
}

/// Same as [`extract`], but stamps default-value samples using `clock`
/// instead of the system clock. Lets tests control the synthesized
/// `updated_at` deterministically.
pub async fn extract_with_clock(
    extracts: &[Extract],
    connectors: &AppConnectors<RefocusSample>,
    shutdown: &ShutdownSignal,
    status: &SystemStatus,
    clock: &dyn Clock,
) -> Matrix {
    let mut by_endpoint: HashMap<&str, Vec<&Extract>> = HashMap::new();
    for e in extracts {
        by_endpoint.entry(e.endpoint_id()).or_default().push(e);
    }

    let endpoint_matrices = futures::future::join_all(
        by_endpoint
            .into_iter()
            .map(|(endpoint_id, group)| process_endpoint(endpoint_id, group, connectors, shutdown, status, clock)),
    )
    .await;

    Matrix::concat(endpoint_matrices)
}

async fn process_endpoint(
    endpoint_id: &str,
    group: Vec<&Extract>,
    connectors: &AppConnectors<RefocusSample>,
    shutdown: &ShutdownSignal,
    status: &SystemStatus,
    clock: &dyn Clock,
) -> Matrix {
    let (client, cache) = match connectors.client_and_cache_for(endpoint_id, SERVICE_CLASS) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(endpoint = endpoint_id, error = %e, "no connector for endpoint");
            status.meter(METER_NAME, MeterKind::Failure);
            return Matrix::empty();
        }
    };

    if client.authenticate().await.is_err() {
        warn!(endpoint = endpoint_id, "authentication failed; yielding no rows for endpoint");
        status.meter(METER_NAME, MeterKind::AuthenticationFailure);
        status.meter(METER_NAME, MeterKind::Failure);
        return Matrix::empty();
    }

    let mut rows = Vec::with_capacity(group.len());
    for e in group {
        if let Some(row) = resolve_one(e, &client, &cache, shutdown, status, clock).await {
            rows.push(vec![row]);
        }
    }
    Matrix::new(rows)
}

enum Resolution {
    Found(RefocusSample, bool),
    NoData,
    Failure,
    AuthenticationFailure,
    /// Shutdown observed on a cache miss, before the remote call. Not one
    /// of the four terminal outcomes spec §4.4 meters; yields no row and
    /// marks nothing.
    Cancelled,
}

async fn resolve_one(
    extract: &Extract,
    client: &RemoteClient,
    cache: &Cache<RefocusSample>,
    shutdown: &ShutdownSignal,
    status: &SystemStatus,
    clock: &dyn Clock,
) -> Option<Transmutation> {
    let resolution = resolve_sample(extract, client, cache, shutdown, status, clock).await;
    match resolution {
        Resolution::Found(sample, is_default) => match create_result(extract, &sample, is_default) {
            Ok(t) => {
                status.meter(METER_NAME, MeterKind::Success);
                Some(t)
            }
            Err(e) => {
                warn!(name = extract.name(), error = %e, "sample dropped");
                status.meter(METER_NAME, MeterKind::NoData);
                None
            }
        },
        Resolution::NoData => {
            status.meter(METER_NAME, MeterKind::NoData);
            None
        }
        Resolution::Failure => {
            status.meter(METER_NAME, MeterKind::Failure);
            None
        }
        Resolution::AuthenticationFailure => {
            status.meter(METER_NAME, MeterKind::AuthenticationFailure);
            status.meter(METER_NAME, MeterKind::Failure);
            None
        }
        Resolution::Cancelled => None,
    }
}

/// Cache-then-remote resolution for one Extract (spec §4.4c). The cache is
/// probed first regardless of drain state, so a non-expired cache hit is
/// always served; `shutdown` is only consulted on a cache miss, right
/// before the remote call.
async fn resolve_sample(
    extract: &Extract,
    client: &RemoteClient,
    cache: &Cache<RefocusSample>,
    shutdown: &ShutdownSignal,
    status: &SystemStatus,
    clock: &dyn Clock,
) -> Resolution {
    if let Some(cached) = cache.get(&extract.cache_key()) {
        return Resolution::Found(cached, false);
    }

    if shutdown.is_draining() {
        return Resolution::Cancelled;
    }

    let timer = status.timer(METER_NAME, "fetch_samples");
    let request = client.get("/v1/samples").query(&[("name", extract.name())]);
    let result = client
        .execute_with_auth_retry::<Vec<RefocusSample>>(request, Vec::new())
        .await;
    timer.stop();

    let samples = match result {
        Ok(samples) => samples,
        Err(_) => return Resolution::AuthenticationFailure,
    };

    if samples.is_empty() {
        return Resolution::Failure;
    }

    if extract.cache_millis() > 0 {
        for s in &samples {
            if s.value != TIMEOUT_SENTINEL {
                cache.put(s.clone(), extract.cache_millis());
            }
        }
    }

    let selected = samples
        .into_iter()
        .find(|s| s.cache_key() == extract.cache_key());

    match selected {
        Some(sample) if sample.value != TIMEOUT_SENTINEL => Resolution::Found(sample, false),
        _ => match extract.default_value() {
            Some(default_value) => Resolution::Found(
                RefocusSample {
                    name: extract.filtered_name().to_string(),
                    value: default_value.to_string(),
                    updated_at: clock.utc_now().to_rfc3339(),
                },
                true,
            ),
            None => Resolution::NoData,
        },
    }
}

/// Parses a raw Sample into a `Transmutation` (spec §4.4d). Appends a
/// default-value annotation when `is_default`.
fn create_result(
    extract: &Extract,
    sample: &RefocusSample,
    is_default: bool,
) -> Result<Transmutation, DataError> {
    let time: DateTime<Utc> = DateTime::parse_from_rfc3339(&sample.updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DataError::BadTimestamp {
            name: sample.name.clone(),
            raw: sample.updated_at.clone(),
        })?;

    if sample.value == TIMEOUT_SENTINEL {
        return Err(DataError::BadValue {
            name: sample.name.clone(),
            raw: sample.value.clone(),
        });
    }

    let value: f64 = sample.value.parse().map_err(|_| DataError::BadValue {
        name: sample.name.clone(),
        raw: sample.value.clone(),
    })?;

    let point = Transmutation::new(time, extract.filtered_name(), value);
    Ok(if is_default {
        point.with_metadata_message(format!(
            "using default value {value} for {}: no sample available",
            extract.filtered_name()
        ))
    } else {
        point
    })
}

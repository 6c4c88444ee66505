//! Error taxonomy for pyplyn.
//!
//! Each concern gets its own `thiserror` enum rather than one crate-wide
//! error, following the per-module error style used throughout the
//! reference workspace (see `error::WorkflowError` and its siblings).
//! `anyhow` is reserved for the process boundary in `main.rs`.

use thiserror::Error;

/// Missing or invalid configuration, connector record, or startup input.
///
/// Fatal at startup; logged and skipped on a runtime reload (spec §7).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    NotFound { path: String },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },

    #[error("no connector registered for endpoint {endpoint_id}")]
    UnknownConnector { endpoint_id: String },
}

/// Remote service returned 401 twice, or the auth exchange itself failed.
///
/// Triggers the single-shot retry policy (spec §4.2); a second occurrence
/// surfaces to the caller and the current Extract yields no row.
#[derive(Error, Debug)]
pub enum UnauthorizedError {
    #[error("authentication exchange failed for endpoint {endpoint_id}: {reason}")]
    AuthExchangeFailed { endpoint_id: String, reason: String },

    #[error("request to {endpoint_id} was unauthorized after retry")]
    RetryExhausted { endpoint_id: String },
}

/// I/O failure, non-401 HTTP >= 400, or a malformed response body.
///
/// Logged; the current Extract yields no row. Never retried.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {endpoint_id} failed: {source}")]
    Io {
        endpoint_id: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint_id} responded with status {status}")]
    HttpStatus { endpoint_id: String, status: u16 },
}

/// A Sample was present but its time or value could not be parsed.
///
/// Marks `noData` and drops the point (spec §4.4d); never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("sample {name} has an unparseable timestamp: {raw}")]
    BadTimestamp { name: String, raw: String },

    #[error("sample {name} has an unparseable value: {raw}")]
    BadValue { name: String, raw: String },
}

/// An invariant was violated (e.g. `AppConnectors` missing a known
/// `endpointId`). Logged at error level; aborts the current
/// Configuration's pipeline run, never the process.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Top-level error for a single ETL pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

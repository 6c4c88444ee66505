//! Connector records and registry: named `(endpoint, credentials,
//! timeouts, proxy)` tuples (spec §2.5, §3).

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::ConfigError;

/// On-disk/wire shape of a connector record (spec §6): password travels as
/// base64 bytes and is decoded on demand, never retained decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub id: String,
    pub endpoint: String,
    pub username: String,
    pub password_base64: String,
    pub connect_timeout_millis: u64,
    pub read_timeout_millis: u64,
    pub write_timeout_millis: u64,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
}

/// A named connector: endpoint, credentials, timeout profile, optional
/// proxy (spec §3). Password bytes are never stored decoded; every read
/// goes through [`Connector::read_password_bytes`], which decodes fresh
/// from the stored base64 string and hands the caller a buffer it is
/// expected to zero immediately after use.
#[derive(Debug, Clone)]
pub struct Connector {
    pub id: String,
    pub endpoint: String,
    pub username: String,
    password_base64: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<u16>,
}

impl Connector {
    pub fn from_record(record: ConnectorRecord) -> Self {
        Self {
            id: record.id,
            endpoint: record.endpoint,
            username: record.username,
            password_base64: record.password_base64,
            connect_timeout: Duration::from_millis(record.connect_timeout_millis),
            read_timeout: Duration::from_millis(record.read_timeout_millis),
            write_timeout: Duration::from_millis(record.write_timeout_millis),
            proxy_host: record.proxy_host,
            proxy_port: record.proxy_port,
        }
    }

    /// Re-reads the password from its source-derived base64 encoding as a
    /// fresh byte buffer, on every call (spec §3, §5 "Password handling").
    /// The caller must call [`Zeroize::zeroize`] on the returned buffer as
    /// soon as it has handed the bytes to the authenticator.
    pub fn read_password_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.password_base64)
            .map_err(|e| ConfigError::Invalid {
                reason: format!("connector {} has an unparseable password: {e}", self.id),
            })
    }

    pub fn proxy_url(&self) -> Option<String> {
        match (&self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) => Some(format!("{host}:{port}")),
            _ => None,
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.password_base64.zeroize();
    }
}

/// Registry of [`Connector`]s keyed by `id`. Built once from the
/// connector source (spec §6) and treated as immutable once published.
#[derive(Debug, Clone, Default)]
pub struct ConnectorRegistry {
    by_id: HashMap<String, Connector>,
}

impl ConnectorRegistry {
    pub fn new(connectors: Vec<Connector>) -> Self {
        let by_id = connectors.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self { by_id }
    }

    pub fn get(&self, endpoint_id: &str) -> Result<&Connector, ConfigError> {
        self.by_id
            .get(endpoint_id)
            .ok_or_else(|| ConfigError::UnknownConnector {
                endpoint_id: endpoint_id.to_string(),
            })
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let records: Vec<ConnectorRecord> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse {
                reason: format!("connector records: {e}"),
            })?;
        let connectors = records.into_iter().map(Connector::from_record).collect();
        Ok(Self::new(connectors))
    }
}

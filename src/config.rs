//! `AppConfig` (spec §6): the TOML-deserialized application configuration,
//! connector loading, and the `ConfigurationLoader` trait + reference
//! implementation. Grounded in the teacher's `knhk-config/src/config.rs`
//! `load_config`/`apply_env_overrides` pair.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::connector::ConnectorRegistry;
use crate::error::ConfigError;
use crate::model::Configuration;
use crate::update_manager::ConfigurationLoader;

/// `[global]` section (spec §6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub configurations_path: String,
    pub connectors_path: String,
    pub run_once: bool,
    pub update_configuration_interval_millis: i64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            configurations_path: "configurations.json".to_string(),
            connectors_path: "connectors.json".to_string(),
            run_once: false,
            update_configuration_interval_millis: 60_000,
        }
    }
}

/// `[hazelcast]` section (spec §6): cluster membership wiring.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HazelcastConfig {
    pub enabled: bool,
    pub config: Option<String>,
}

/// `[alert]` section (spec §6). Thresholds named here are not otherwise
/// interpreted by this crate (alert dispatch is out of scope, spec §1); the
/// section is carried so a complete `AppConfig` round-trips.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub check_interval_millis: i64,
    pub thresholds: HashMap<String, f64>,
}

/// Top-level application configuration (spec §6).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub global: GlobalConfig,
    pub hazelcast: HazelcastConfig,
    pub alert: AlertConfig,
}

impl AppConfig {
    /// Loads `path` as TOML, then applies `PYPLYN_<SECTION>_<KEY>`
    /// environment overrides (e.g. `PYPLYN_GLOBAL_RUN_ONCE=true`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("PYPLYN").separator("_"))
            .build()
            .map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?;

        source.try_deserialize().map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }
}

/// Reads the connector registry from a JSON file (spec §6).
pub fn load_connectors(path: &Path) -> Result<ConnectorRegistry, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.display().to_string(),
            }
        } else {
            ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            }
        }
    })?;
    ConnectorRegistry::from_json(&raw)
}

/// Reads the Configuration set from a JSON file: an array of
/// [`Configuration`] values (spec §6, §3).
pub struct StaticConfigurationLoader {
    path: PathBuf,
}

impl StaticConfigurationLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigurationLoader for StaticConfigurationLoader {
    async fn load(&self) -> Result<HashSet<Configuration>, ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: self.path.display().to_string(),
                }
            } else {
                ConfigError::Io {
                    path: self.path.display().to_string(),
                    source: e,
                }
            }
        })?;
        let configurations: Vec<Configuration> =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                reason: format!("configurations: {e}"),
            })?;
        Ok(configurations.into_iter().collect())
    }
}

//! Configuration management for queryview.
//!
//! Loads execution policy, caller capabilities and data source descriptors
//! from a TOML file. A missing file yields the defaults.

use crate::error::{QueryViewError, Result};
use crate::model::{DataSource, DataSourceId};
use crate::view::Capabilities;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for queryview.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Execution policy.
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Capabilities of the current user.
    #[serde(default)]
    pub permissions: Capabilities,

    /// Data sources, keyed by id.
    #[serde(default)]
    pub data_sources: BTreeMap<String, DataSourceConfig>,
}

/// How executions are started, polled and cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// A new execution replaces the in-flight one instead of being rejected.
    #[serde(default)]
    pub supersede_in_flight: bool,

    /// Interval between backend status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a cancel request may stay unanswered before the execution is
    /// failed locally.
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_cancel_timeout_ms() -> u64 {
    5000
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            supersede_in_flight: false,
            poll_interval_ms: default_poll_interval_ms(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
        }
    }
}

impl ExecutionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

/// A data source entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,

    /// Backend type, e.g. `pg`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Connection URL, e.g. `postgres://host:5432/warehouse`.
    pub url: Option<String>,

    #[serde(default)]
    pub view_only: bool,

    #[serde(default)]
    pub paused: bool,
}

fn default_kind() -> String {
    "pg".to_string()
}

impl DataSourceConfig {
    /// Builds the descriptor for the data source with the given id.
    pub fn to_data_source(&self, id: DataSourceId) -> Result<DataSource> {
        let url = self
            .url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| {
                QueryViewError::config(format!("Invalid URL for data source {id}: {e}"))
            })?;

        Ok(DataSource {
            id,
            name: self.name.clone(),
            kind: self.kind.clone(),
            url,
            view_only: self.view_only,
            paused: self.paused,
        })
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("queryview")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| QueryViewError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            QueryViewError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolves every configured data source, failing on the first bad entry.
    pub fn data_sources(&self) -> Result<Vec<DataSource>> {
        self.data_sources
            .iter()
            .map(|(key, entry)| {
                let id = key.parse::<i64>().map(DataSourceId).map_err(|_| {
                    QueryViewError::config(format!("Data source key '{key}' is not a numeric id"))
                })?;
                entry.to_data_source(id)
            })
            .collect()
    }
}

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::trace;

use crate::model::TenantConfiguration;

/// Storage backend configuration of the hub
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence, single hub only)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./canopy.db")
}

/// A Prometheus- or Loki-compatible query endpoint used by metric checks.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MetricBackendConfig {
    pub url: String,
    pub token: Option<String>,
    /// Resolution of range queries in seconds
    #[serde(default = "default_step")]
    pub step: u64,
}

impl MetricBackendConfig {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step.max(1))
    }
}

fn default_step() -> u64 {
    15
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    /// Base URL of the hub, e.g. `http://hub:51244`
    pub hub_url: String,
    pub token: Option<String>,
    pub environment: String,
    #[serde(default)]
    pub tenants: Vec<String>,

    /// Seconds between two monitoring cycles of a tenant
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_smoothing_tolerance")]
    pub smoothing_tolerance: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Timeout in seconds for every outbound request
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    pub prometheus: Option<MetricBackendConfig>,
    pub loki: Option<MetricBackendConfig>,
}

impl AgentConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

fn default_interval() -> u64 {
    30
}

fn default_smoothing_tolerance() -> u32 {
    2
}

fn default_max_concurrency() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    10
}

/// Where the hub reads and writes status history.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct TimeSeriesConfig {
    /// Prometheus-compatible query endpoint
    pub query_url: Option<String>,
    /// Endpoint accepting text exposition lines, e.g. `/api/v1/import/prometheus`
    pub import_url: String,
    pub token: Option<String>,
    /// How far back status reads look, in seconds
    #[serde(default = "default_lookback")]
    pub lookback: u64,
}

fn default_lookback() -> u64 {
    300
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between two recording passes
    #[serde(default = "default_maintenance_interval")]
    pub interval: u64,
    /// Seconds after which a lock left by a crashed hub is reclaimed
    pub stale_after: Option<u64>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: default_maintenance_interval(),
            stale_after: None,
        }
    }
}

fn default_maintenance_interval() -> u64 {
    60
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubConfig {
    #[serde(default = "crate::util::get_addr")]
    pub addr: IpAddr,
    #[serde(default = "crate::util::get_port")]
    pub port: u16,
    pub token: Option<String>,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    #[serde(default)]
    pub storage: StorageConfig,
    pub timeseries: Option<TimeSeriesConfig>,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default = "default_error_report_capacity")]
    pub error_report_capacity: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// environment -> tenant -> service hierarchy
    #[serde(default)]
    pub environments: BTreeMap<String, BTreeMap<String, TenantConfiguration>>,
}

fn default_enable_cors() -> bool {
    true
}

fn default_error_report_capacity() -> usize {
    500
}

pub fn read_config_file<T: DeserializeOwned + Debug>(path: &str) -> anyhow::Result<T> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

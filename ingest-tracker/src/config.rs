//! Configuration for ingest-tracker
//!
//! Resolution priority: command line → environment → TOML file → defaults.
//! The TOML file lives at `~/.config/ingest/ingest-tracker.toml` unless
//! `--config` says otherwise; every section and key is optional.

use ingest_common::config::LoggingConfig;
use ingest_common::db::PoolSettings;
use ingest_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub root_folder: Option<PathBuf>,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub portal: PortalConfig,
    pub rate_limit: RateLimitConfig,
    pub debias: DebiasConfig,
    pub fanout: FanoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File name inside the root folder; every instance must point at the same file
    pub file_name: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file_name: "ingest.db".to_string(),
            max_connections: 20,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            busy_timeout_ms: self.busy_timeout_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5740".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Search URL prefix; `<dataset id>_<dataset name>*` is appended
    pub publish_dataset_url: String,
    /// Record ids listed per lowest tier in progress reports
    pub tier_zero_sample_size: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            publish_dataset_url: "https://www.europeana.eu/en/search?query=edm_datasetName:"
                .to_string(),
            tier_zero_sample_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Tokens per bucket
    pub capacity: u32,
    /// Bucket is refilled to capacity once per interval
    pub refill_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10,
            refill_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_secs(self.refill_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebiasConfig {
    /// How long a start request waits for the dataset lock before giving up
    pub lock_wait_ms: u64,
    /// Lease after which a lock left by a crashed instance may be taken over
    pub lock_lease_ms: u64,
    /// Bias-detection service endpoint; without it start requests are refused
    pub service_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for DebiasConfig {
    fn default() -> Self {
        Self {
            lock_wait_ms: 2000,
            lock_lease_ms: 30_000,
            service_url: None,
            request_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Concurrent sends per publisher
    pub max_in_flight: usize,
    /// Queue gateway for HTTP fan-out
    pub queue_base_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            queue_base_url: None,
            request_timeout_secs: 10,
        }
    }
}

impl TrackerConfig {
    /// Load from `path`, or defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let config: TrackerConfig = ingest_common::config::load_toml_config(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.capacity == 0 {
            return Err(Error::Config("rate_limit.capacity must be at least 1".to_string()));
        }
        if self.rate_limit.refill_seconds == 0 {
            return Err(Error::Config(
                "rate_limit.refill_seconds must be at least 1".to_string(),
            ));
        }
        if self.debias.lock_lease_ms <= self.debias.lock_wait_ms {
            return Err(Error::Config(
                "debias.lock_lease_ms must exceed debias.lock_wait_ms".to_string(),
            ));
        }
        if self.database.file_name.trim().is_empty() {
            return Err(Error::Config("database.file_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database.file_name)
    }
}

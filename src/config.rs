//! TOML configuration.
//!
//! ```toml
//! [settings]
//! monitoring_interval = 10        # minutes
//! data_dir = "data"
//! registry_file = "stations.csv"
//!
//! [stations]
//! selected_only = true
//! station_list = ["41001", "46042"]
//! airport_list = ["EFJY", "KJFK"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{MonitorError, Result};
use crate::http::RetryPolicy;
use crate::registry::StationSelection;

/// One week, in minutes.
pub const MAX_MONITORING_INTERVAL: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub stations: Stations,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Minutes between polls.
    pub monitoring_interval: u64,
    pub data_dir: PathBuf,
    pub registry_file: PathBuf,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub max_concurrent_fetches: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            monitoring_interval: 10,
            data_dir: PathBuf::from("data"),
            registry_file: PathBuf::from("stations.csv"),
            request_timeout_secs: 20,
            max_retries: 2,
            retry_delay_secs: 2,
            max_concurrent_fetches: 4,
        }
    }
}

impl Settings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Stations {
    pub selected_only: bool,
    pub station_list: Vec<String>,
    pub airport_list: Vec<String>,
}

impl Stations {
    pub fn selection(&self) -> StationSelection {
        StationSelection {
            selected_only: self.selected_only,
            station_ids: self.station_list.iter().map(|s| s.trim().to_string()).collect(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(MonitorError::Config(format!("cannot read {}: {}", path.display(), e))),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| MonitorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.settings.monitoring_interval == 0 {
            return Err(MonitorError::Config("monitoring_interval must be at least 1 minute".into()));
        }
        if self.settings.monitoring_interval > MAX_MONITORING_INTERVAL {
            return Err(MonitorError::Config(format!(
                "monitoring_interval must be at most {} minutes",
                MAX_MONITORING_INTERVAL
            )));
        }
        if self.settings.max_concurrent_fetches == 0 {
            return Err(MonitorError::Config("max_concurrent_fetches must be at least 1".into()));
        }
        if self.settings.request_timeout_secs == 0 {
            return Err(MonitorError::Config("request_timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}

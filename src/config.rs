use std::env;
use std::path::PathBuf;

use crate::store::STORE_FILE_NAME;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LOG_FILTER_ENV: &str = "FLEET_LOG";
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_LOG_FILTER: &str = "fleetkeeper=info";

/// Process configuration sourced from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl FleetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let data_dir = non_empty(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let log_filter = non_empty(LOG_FILTER_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.into());

        Self {
            data_dir,
            log_filter,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

//! Runtime settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::time::Duration;

use crate::alerts::{ALERTS_TIMEOUT, DEFAULT_ALERTS_URL};
use crate::dashboard::DashboardSettings;
use crate::error::StationDataError;
use crate::feeds::DEFAULT_FEED_BASE_URL;
use crate::fetch::FEED_TIMEOUT;
use crate::snapshot::DEFAULT_SNAPSHOT_PATH;
use crate::stations::StationIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub stations_path: Option<PathBuf>,
    pub stop_parent_path: Option<PathBuf>,
    pub feed_base_url: String,
    pub alerts_url: String,
    pub api_key: Option<String>,
    pub snapshot_path: PathBuf,
    pub feed_timeout: Duration,
    pub alerts_timeout: Duration,
    pub dashboard: DashboardSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations_path: None,
            stop_parent_path: None,
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            alerts_url: DEFAULT_ALERTS_URL.to_string(),
            api_key: None,
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            feed_timeout: FEED_TIMEOUT,
            alerts_timeout: ALERTS_TIMEOUT,
            dashboard: DashboardSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Self {
            stations_path: get("SUBWAY_STATIONS_PATH").map(PathBuf::from),
            stop_parent_path: get("SUBWAY_STOP_PARENT_PATH").map(PathBuf::from),
            feed_base_url: get("MTA_FEED_BASE_URL").unwrap_or(defaults.feed_base_url),
            alerts_url: get("MTA_ALERTS_URL").unwrap_or(defaults.alerts_url),
            api_key: get("MTA_API_KEY"),
            snapshot_path: get("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            ..defaults
        }
    }

    /// The station index, from the configured files or the bundled data.
    pub fn load_station_index(&self) -> Result<StationIndex, StationDataError> {
        StationIndex::load(self.stations_path.as_deref(), self.stop_parent_path.as_deref())
    }
}

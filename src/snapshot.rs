//! Compact copy of the nearest station's arrivals, handed to lightweight
//! display surfaces that cannot run the pipeline themselves.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SnapshotError;
use crate::models::StationRealtime;
use crate::realtime::MAX_ARRIVALS;

pub const DEFAULT_SNAPSHOT_PATH: &str = "snapshot/nearest_station.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub id: String,
    pub arrivals: Vec<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestStationSnapshot {
    pub station_id: String,
    pub station_name: String,
    pub distance: Option<f64>,
    pub lines: Vec<SnapshotLine>,
    pub last_updated: DateTime<Utc>,
}

impl NearestStationSnapshot {
    /// One line per served line, destinations folded together and the
    /// soonest arrivals kept.
    pub fn from_station(station: &StationRealtime, last_updated: DateTime<Utc>) -> Self {
        let mut by_line: BTreeMap<&str, Vec<DateTime<Utc>>> = station
            .station
            .lines
            .iter()
            .map(|line| (line.as_str(), Vec::new()))
            .collect();

        for arrival in &station.line_arrivals {
            by_line
                .entry(arrival.line.as_str())
                .or_default()
                .extend(arrival.arrivals.iter().copied());
        }

        let lines = station
            .station
            .lines
            .iter()
            .filter_map(|line| {
                let mut arrivals = by_line.remove(line.as_str())?;
                arrivals.sort();
                arrivals.dedup();
                arrivals.truncate(MAX_ARRIVALS);
                Some(SnapshotLine {
                    id: line.clone(),
                    arrivals,
                })
            })
            .collect();

        Self {
            station_id: station.station.id.clone(),
            station_name: station.station.name.clone(),
            distance: Some(station.distance),
            lines,
            last_updated,
        }
    }
}

/// Load/save contract of the snapshot hand-off.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &NearestStationSnapshot) -> Result<(), SnapshotError>;

    /// `None` when nothing usable is stored.
    fn load(&self) -> Option<NearestStationSnapshot>;

    fn clear(&self) -> Result<(), SnapshotError>;
}

/// Keeps the snapshot as one JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn save(&self, snapshot: &NearestStationSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), station = %snapshot.station_id, "Snapshot saved");
        Ok(())
    }

    fn load(&self) -> Option<NearestStationSnapshot> {
        let bytes = fs::read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to decode snapshot");
                None
            }
        }
    }

    fn clear(&self) -> Result<(), SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

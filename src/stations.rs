//! Read-only station lookup: nearest-station queries and child stop to parent
//! station resolution.
//!
//! A [`StationIndex`] is built once at startup and shared behind an `Arc`; it
//! is never mutated afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use crate::error::StationDataError;
use crate::models::{Coordinate, Station, StationDistance};

const BUNDLED_STATIONS: &str = include_str!("../data/subway_stations.json");
const BUNDLED_STOP_PARENT: &str = include_str!("../data/stop_parent.json");

/// Co-named stations are pulled into a result when they lie within this many
/// metres, even if the query radius is smaller.
pub const MIN_INCLUSION_RADIUS: f64 = 250.0;

#[derive(Debug)]
pub struct StationIndex {
    stations: Vec<Station>,
    by_id: HashMap<String, usize>,
    stop_parent: HashMap<String, String>,
}

impl StationIndex {
    /// Builds an index from already-decoded data. Stop ids resolve only
    /// against the keys of `stop_parent`.
    pub fn new(stations: Vec<Station>, stop_parent: HashMap<String, String>) -> Self {
        let by_id = stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        Self {
            stations,
            by_id,
            stop_parent,
        }
    }

    /// Parses a station list and a stop-to-parent map from JSON text.
    pub fn from_json(stations_json: &str, stop_parent_json: &str) -> Result<Self, StationDataError> {
        let stations: Vec<Station> = serde_json::from_str(stations_json)
            .map_err(|e| StationDataError::Decode(format!("station list: {e}")))?;
        let stop_parent: HashMap<String, String> = serde_json::from_str(stop_parent_json)
            .map_err(|e| StationDataError::Decode(format!("stop map: {e}")))?;

        let index = Self::new(stations, stop_parent);
        info!(
            stations = index.stations.len(),
            stops = index.stop_parent.len(),
            "Station index loaded"
        );
        Ok(index)
    }

    /// Loads the index from files on disk. A missing path falls back to the
    /// bundled copy of that dataset.
    pub fn load(
        stations_path: Option<&Path>,
        stop_parent_path: Option<&Path>,
    ) -> Result<Self, StationDataError> {
        let read = |path: Option<&Path>, bundled: &'static str| match path {
            Some(path) => {
                debug!(path = %path.display(), "Reading station data");
                std::fs::read_to_string(path)
                    .map_err(|_| StationDataError::ResourceMissing(path.to_path_buf()))
            }
            None => Ok(bundled.to_string()),
        };

        Self::from_json(
            &read(stations_path, BUNDLED_STATIONS)?,
            &read(stop_parent_path, BUNDLED_STOP_PARENT)?,
        )
    }

    /// Loads the dataset compiled into the binary.
    pub fn bundled() -> Result<Self, StationDataError> {
        Self::from_json(BUNDLED_STATIONS, BUNDLED_STOP_PARENT)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn station(&self, id: &str) -> Option<&Station> {
        self.by_id.get(id).map(|&i| &self.stations[i])
    }

    /// Up to `limit` stations within `max_distance` metres of `coordinate`,
    /// nearest first, plus co-named stations close to any selected one.
    ///
    /// When nothing lies inside the radius, `allow_fallback` returns the
    /// `limit` nearest stations regardless of distance.
    pub fn nearest_stations(
        &self,
        coordinate: Coordinate,
        limit: usize,
        max_distance: f64,
        allow_fallback: bool,
    ) -> Vec<StationDistance> {
        if self.stations.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<StationDistance> = self
            .stations
            .iter()
            .map(|station| StationDistance {
                distance: coordinate.distance_to(&station.coordinate()),
                station: station.clone(),
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        // widen the window before the radius cut so clustered stations just
        // past the limit still get a chance
        let mut selected: Vec<StationDistance> = scored
            .iter()
            .take(limit.saturating_mul(2))
            .filter(|s| s.distance <= max_distance)
            .take(limit)
            .cloned()
            .collect();

        if selected.is_empty() {
            if !allow_fallback {
                debug!(max_distance, "No stations within radius");
                return Vec::new();
            }
            selected = scored.iter().take(limit).cloned().collect();
        }

        let names: HashSet<String> = selected.iter().map(|s| s.station.name.clone()).collect();
        let mut seen: HashSet<String> = selected.iter().map(|s| s.station.id.clone()).collect();
        let inclusion_radius = max_distance.max(MIN_INCLUSION_RADIUS);

        for candidate in &scored {
            if candidate.distance > inclusion_radius || !names.contains(&candidate.station.name) {
                continue;
            }
            if seen.insert(candidate.station.id.clone()) {
                selected.push(candidate.clone());
            }
        }

        selected.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        selected
    }

    /// Resolves a child stop id to its parent station id.
    ///
    /// Tries, in order: an exact match; the id with trailing characters
    /// removed one at a time, down to a single character; a case-insensitive
    /// match against every known stop id.
    pub fn parent_station_id(&self, stop_id: &str) -> Option<&str> {
        if let Some(parent) = self.stop_parent.get(stop_id) {
            return Some(parent);
        }

        let mut candidate = stop_id.to_string();
        while candidate.chars().count() > 1 {
            candidate.pop();
            if let Some(parent) = self.stop_parent.get(&candidate) {
                return Some(parent);
            }
        }

        let lowered = stop_id.to_lowercase();
        self.stop_parent
            .iter()
            .filter(|(key, _)| key.to_lowercase() == lowered)
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, parent)| parent.as_str())
    }

    /// Resolves every stop id, dropping those that do not resolve.
    pub fn parent_station_ids<'a, I>(&self, stop_ids: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        stop_ids
            .into_iter()
            .filter_map(|id| self.parent_station_id(id))
            .map(str::to_owned)
            .collect()
    }
}

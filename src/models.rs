//! Core data types shared by the station index, the realtime pipeline and the
//! alert normalizer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        self.point().haversine_distance(&other.point())
    }

    fn point(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub lines: Vec<String>,
}

impl Station {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Whether `line` is served here, ignoring case.
    pub fn serves(&self, line: &str) -> bool {
        self.lines.iter().any(|l| l.eq_ignore_ascii_case(line))
    }
}

/// A station together with its distance in metres from a query point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationDistance {
    pub station: Station,
    pub distance: f64,
}

/// Upcoming arrivals of one line towards one destination.
///
/// `destination` is `None` for the placeholder entry of a served line that
/// currently has no predictions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineArrival {
    pub line: String,
    pub destination: Option<String>,
    pub arrivals: Vec<DateTime<Utc>>,
    pub alerts: Vec<ServiceAlert>,
}

impl LineArrival {
    pub fn empty(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            destination: None,
            arrivals: Vec::new(),
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationRealtime {
    pub station: Station,
    pub distance: f64,
    pub line_arrivals: Vec<LineArrival>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivePeriod {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl ActivePeriod {
    /// A period without an end stays active once started.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && self.end.is_none_or(|end| instant <= end)
    }
}

/// A service disruption notice scoped to lines and stops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAlert {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub lines: BTreeSet<String>,
    pub stops: BTreeSet<String>,
    pub alert_type: Option<String>,
    pub active_periods: Vec<ActivePeriod>,
}

impl ServiceAlert {
    pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
        self.active_periods.iter().any(|p| p.contains(instant))
    }

    pub fn is_active_now(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::parser::TripUpdate;

/// Field coverage of one decoded trip feed, one CSV row per inspection.
#[derive(Debug, Default, Serialize)]
pub struct FeedStats {
    pub timestamp: DateTime<Utc>,
    pub feed_id: Option<String>,
    pub source: Option<String>,
    pub bytes: usize,

    // trip updates
    pub trip_updates: usize,
    pub with_route: usize,
    pub with_trip_id: usize,
    pub with_timestamp: usize,

    // stop time updates
    pub stop_time_updates: usize,
    pub with_stop_id: usize,
    pub with_stop_sequence: usize,
    pub with_arrival_time: usize,
    pub with_departure_time: usize,
    pub with_delay: usize,

    /// Distinct route ids, space separated.
    pub routes: String,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl FeedStats {
    pub fn from_trip_updates(trip_updates: &[TripUpdate], bytes: usize) -> Self {
        let mut s = FeedStats {
            timestamp: Utc::now(),
            bytes,
            trip_updates: trip_updates.len(),
            ..Default::default()
        };
        let mut routes = BTreeSet::new();

        for t in trip_updates {
            if let Some(route) = &t.route_id {
                s.with_route += 1;
                routes.insert(route.as_str());
            }

            if t.trip_id.is_some() {
                s.with_trip_id += 1;
            }

            if t.timestamp.is_some() {
                s.with_timestamp += 1;
            }

            for u in &t.stop_time_updates {
                s.stop_time_updates += 1;

                if u.stop_id.is_some() {
                    s.with_stop_id += 1;
                }

                if u.stop_sequence.is_some() {
                    s.with_stop_sequence += 1;
                }

                if u.arrival.as_ref().is_some_and(|e| e.time.is_some()) {
                    s.with_arrival_time += 1;
                }

                if u.departure.as_ref().is_some_and(|e| e.time.is_some()) {
                    s.with_departure_time += 1;
                }

                if [&u.arrival, &u.departure]
                    .into_iter()
                    .flatten()
                    .any(|e| e.delay.is_some())
                {
                    s.with_delay += 1;
                }
            }
        }

        s.routes = routes.into_iter().collect::<Vec<_>>().join(" ");
        s
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn arrival_pct(&self) -> f64 {
        Self::pct(self.with_arrival_time, self.stop_time_updates)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        FeedStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    /// Set where the feed came from
    pub fn with_source(mut self, feed_id: Option<&str>, source: &str) -> Self {
        self.feed_id = feed_id.map(str::to_string);
        self.source = Some(source.to_string());
        self
    }
}

//! Sequential reducer turning decoded trip updates into per-station arrivals.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, TimeDelta, Utc};

use crate::models::{LineArrival, Station};
use crate::parser::{StopTimeUpdate, TripUpdate};
use crate::stations::StationIndex;

/// Arrivals kept per line and destination.
pub const MAX_ARRIVALS: usize = 2;

/// Predictions this far in the past are still shown.
pub const STALE_AFTER_SECS: i64 = 30;

/// (line, destination)
type ArrivalKey = (String, String);

/// Stations and lines an aggregation run cares about.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub station_ids: HashSet<String>,
    /// Upper-cased line codes.
    pub lines: HashSet<String>,
}

impl Targets {
    pub fn new<'a, I>(stations: I) -> Self
    where
        I: IntoIterator<Item = &'a Station>,
    {
        let mut targets = Targets::default();
        for station in stations {
            targets.station_ids.insert(station.id.clone());
            targets
                .lines
                .extend(station.lines.iter().map(|l| l.to_uppercase()));
        }
        targets
    }
}

/// Event times grouped by station, then by (line, destination).
///
/// Times are kept in sets so the result does not depend on the order feeds
/// are absorbed in.
#[derive(Debug, Default, PartialEq)]
pub struct Predictions {
    by_station: BTreeMap<String, BTreeMap<ArrivalKey, BTreeSet<DateTime<Utc>>>>,
}

impl Predictions {
    pub fn record(&mut self, station_id: &str, line: &str, destination: &str, time: DateTime<Utc>) {
        self.by_station
            .entry(station_id.to_string())
            .or_default()
            .entry((line.to_string(), destination.to_string()))
            .or_default()
            .insert(time);
    }

    /// Folds one feed's trip updates in.
    pub fn absorb(&mut self, trip_updates: &[TripUpdate], targets: &Targets, index: &StationIndex) {
        for trip in trip_updates {
            let Some(line) = trip.route_id.as_deref().map(str::to_uppercase) else {
                continue;
            };
            if !targets.lines.contains(&line) {
                continue;
            }

            let ordered = ordered_stop_updates(&trip.stop_time_updates);
            let destination = destination_label(&ordered, &line, index);

            for update in ordered {
                let Some(parent) = update
                    .stop_id
                    .as_deref()
                    .and_then(|id| index.parent_station_id(id))
                else {
                    continue;
                };
                if !targets.station_ids.contains(parent) {
                    continue;
                }
                let Some(time) = update.event_time() else {
                    continue;
                };

                self.record(parent, &line, &destination, time);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_station.is_empty()
    }

    /// One entry per served line: a [`LineArrival`] per destination with
    /// upcoming times, or an empty placeholder when there are none.
    pub fn station_arrivals(&self, station: &Station, now: DateTime<Utc>) -> Vec<LineArrival> {
        let cutoff = now - TimeDelta::seconds(STALE_AFTER_SECS);
        let mut arrivals = Vec::new();

        if let Some(keys) = self.by_station.get(&station.id) {
            for ((line, destination), times) in keys {
                let Some(served) = station.lines.iter().find(|l| l.eq_ignore_ascii_case(line)) else {
                    continue;
                };

                let upcoming: Vec<_> = times
                    .iter()
                    .filter(|t| **t >= cutoff)
                    .take(MAX_ARRIVALS)
                    .copied()
                    .collect();
                if upcoming.is_empty() {
                    continue;
                }

                arrivals.push(LineArrival {
                    line: served.clone(),
                    destination: Some(destination.clone()),
                    arrivals: upcoming,
                    alerts: Vec::new(),
                });
            }
        }

        for line in &station.lines {
            if !arrivals.iter().any(|a| a.line.eq_ignore_ascii_case(line)) {
                arrivals.push(LineArrival::empty(line.clone()));
            }
        }

        sort_line_arrivals(&mut arrivals);
        arrivals
    }
}

/// Stop updates ordered by stop sequence. Updates without a sequence keep
/// their feed order and go last.
pub fn ordered_stop_updates(updates: &[StopTimeUpdate]) -> Vec<&StopTimeUpdate> {
    let mut ordered: Vec<_> = updates.iter().collect();
    // stable: equal sequences keep feed order
    ordered.sort_by_key(|u| (u.stop_sequence.is_none(), u.stop_sequence.unwrap_or(0)));
    ordered
}

/// Human-readable destination of a trip.
///
/// Uses the name of the station the last identified stop belongs to, then a
/// direction read from that stop id's suffix, then `"<line> service"`.
pub fn destination_label(ordered: &[&StopTimeUpdate], line: &str, index: &StationIndex) -> String {
    let last_stop = ordered.iter().rev().find_map(|u| u.stop_id.as_deref());

    if let Some(stop_id) = last_stop {
        if let Some(station) = index
            .parent_station_id(stop_id)
            .and_then(|parent| index.station(parent))
        {
            return station.name.clone();
        }
        if let Some(direction) = direction_label(stop_id) {
            return direction.to_string();
        }
    }

    format!("{line} service")
}

fn direction_label(stop_id: &str) -> Option<&'static str> {
    match stop_id.chars().last()?.to_ascii_uppercase() {
        'N' => Some("Uptown"),
        'S' => Some("Downtown"),
        'E' => Some("Eastbound"),
        'W' => Some("Westbound"),
        _ => None,
    }
}

/// Orders by line, then destination, both ignoring case.
pub fn sort_line_arrivals(arrivals: &mut [LineArrival]) {
    arrivals.sort_by(|a, b| {
        compare_ignore_case(&a.line, &b.line)
            .then_with(|| compare_ignore_case(destination(a), destination(b)))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| destination(a).cmp(destination(b)))
    });
}

fn destination(arrival: &LineArrival) -> &str {
    arrival.destination.as_deref().unwrap_or("")
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

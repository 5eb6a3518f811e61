//! Reader for GTFS Realtime trip-update feeds.
//!
//! Built on [`WireDecoder`]: every message type is walked with a fresh decoder
//! and only the field numbers listed below are picked out. Anything else is
//! ignored, and a field that cannot be read is left as `None`.
//!
//! | Message          | Fields used                                        |
//! |------------------|----------------------------------------------------|
//! | `FeedMessage`    | 2 `entity`                                         |
//! | `FeedEntity`     | 3 `trip_update`                                    |
//! | `TripUpdate`     | 1 `trip`, 2 `stop_time_update`, 4 `timestamp`      |
//! | `TripDescriptor` | 1 `trip_id`, 5 `route_id`                          |
//! | `StopTimeUpdate` | 1 `stop_sequence`, 2 `arrival`, 3 `departure`, 4 `stop_id` |
//! | `StopTimeEvent`  | 1 `delay`, 2 `time`                                |

use chrono::{DateTime, TimeDelta, Utc};

use crate::wire::{Field, WireDecoder};

#[derive(Debug, Clone, PartialEq)]
pub struct TripUpdate {
    pub trip_id: Option<String>,
    pub route_id: Option<String>,
    pub stop_time_updates: Vec<StopTimeUpdate>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeUpdate {
    pub stop_id: Option<String>,
    pub stop_sequence: Option<u32>,
    pub arrival: Option<StopTimeEvent>,
    pub departure: Option<StopTimeEvent>,
}

impl StopTimeUpdate {
    /// Arrival time when known, otherwise the departure time.
    pub fn event_time(&self) -> Option<DateTime<Utc>> {
        self.arrival
            .as_ref()
            .and_then(|e| e.time)
            .or_else(|| self.departure.as_ref().and_then(|e| e.time))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeEvent {
    pub time: Option<DateTime<Utc>>,
    pub delay: Option<TimeDelta>,
}

#[derive(Default)]
struct TripDescriptor {
    trip_id: Option<String>,
    route_id: Option<String>,
}

/// Decodes every trip update in a raw feed payload.
///
/// Never fails: bytes that cannot be read end the walk of the message they
/// belong to, and whatever was decoded up to that point is kept.
pub fn parse_feed(bytes: &[u8]) -> Vec<TripUpdate> {
    WireDecoder::new(bytes)
        .filter(|f| f.number == 2)
        .filter_map(|f| f.value.as_bytes())
        .flat_map(parse_entity)
        .collect()
}

fn parse_entity(bytes: &[u8]) -> Vec<TripUpdate> {
    WireDecoder::new(bytes)
        .filter(|f| f.number == 3)
        .filter_map(|f| f.value.as_bytes())
        .filter_map(parse_trip_update)
        .collect()
}

fn parse_trip_update(bytes: &[u8]) -> Option<TripUpdate> {
    let mut descriptor = None;
    let mut stop_time_updates = Vec::new();
    let mut timestamp = None;

    for Field { number, value } in WireDecoder::new(bytes) {
        match number {
            1 => {
                if let Some(payload) = value.as_bytes() {
                    descriptor = Some(parse_trip_descriptor(payload));
                }
            }
            2 => {
                if let Some(update) = value.as_bytes().and_then(parse_stop_time_update) {
                    stop_time_updates.push(update);
                }
            }
            4 => {
                if let Some(secs) = value.as_i64() {
                    timestamp = DateTime::from_timestamp(secs, 0);
                }
            }
            _ => {}
        }
    }

    // Neither a descriptor nor any stops: nothing worth keeping.
    if descriptor.is_none() && stop_time_updates.is_empty() {
        return None;
    }

    let descriptor = descriptor.unwrap_or_default();

    Some(TripUpdate {
        trip_id: descriptor.trip_id,
        route_id: descriptor.route_id,
        stop_time_updates,
        timestamp,
    })
}

fn parse_trip_descriptor(bytes: &[u8]) -> TripDescriptor {
    let mut descriptor = TripDescriptor::default();

    for Field { number, value } in WireDecoder::new(bytes) {
        match number {
            1 => descriptor.trip_id = value.as_str().map(str::to_owned).or(descriptor.trip_id),
            5 => descriptor.route_id = value.as_str().map(str::to_owned).or(descriptor.route_id),
            _ => {}
        }
    }

    descriptor
}

fn parse_stop_time_update(bytes: &[u8]) -> Option<StopTimeUpdate> {
    let mut update = StopTimeUpdate {
        stop_id: None,
        stop_sequence: None,
        arrival: None,
        departure: None,
    };

    for Field { number, value } in WireDecoder::new(bytes) {
        match number {
            1 => update.stop_sequence = value.as_u32().or(update.stop_sequence),
            2 => {
                if let Some(payload) = value.as_bytes() {
                    update.arrival = Some(parse_event(payload));
                }
            }
            3 => {
                if let Some(payload) = value.as_bytes() {
                    update.departure = Some(parse_event(payload));
                }
            }
            4 => update.stop_id = value.as_str().map(str::to_owned).or(update.stop_id),
            _ => {}
        }
    }

    if update.stop_id.is_none() && update.arrival.is_none() && update.departure.is_none() {
        return None;
    }

    Some(update)
}

fn parse_event(bytes: &[u8]) -> StopTimeEvent {
    let mut event = StopTimeEvent {
        time: None,
        delay: None,
    };

    for Field { number, value } in WireDecoder::new(bytes) {
        match number {
            // int32 delay arrives as a sign-extended varint
            1 => {
                if let Some(secs) = value.as_i64() {
                    event.delay = TimeDelta::try_seconds(secs);
                }
            }
            2 => {
                if let Some(secs) = value.as_i64() {
                    event.time = DateTime::from_timestamp(secs, 0);
                }
            }
            _ => {}
        }
    }

    event
}

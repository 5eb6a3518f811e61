//! Fixtures for unit tests.
//!
//! A trimmed copy of the GTFS-Realtime schema, encoded with `prost`, so the
//! hand-written reader is exercised against bytes produced by a real encoder,
//! plus an in-memory feed transport.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

use crate::error::FetchError;
use crate::feeds::FeedSource;
use crate::fetch::FeedTransport;
use crate::models::Station;
use crate::stations::StationIndex;

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeedMessage {
    #[prost(message, optional, tag = "1")]
    pub header: Option<FeedHeader>,
    #[prost(message, repeated, tag = "2")]
    pub entity: Vec<FeedEntity>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeedHeader {
    #[prost(string, tag = "1")]
    pub gtfs_realtime_version: String,
    #[prost(uint64, optional, tag = "3")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FeedEntity {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(bool, optional, tag = "2")]
    pub is_deleted: Option<bool>,
    #[prost(message, optional, tag = "3")]
    pub trip_update: Option<TripUpdate>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TripUpdate {
    #[prost(message, optional, tag = "1")]
    pub trip: Option<TripDescriptor>,
    #[prost(message, repeated, tag = "2")]
    pub stop_time_update: Vec<StopTimeUpdate>,
    #[prost(uint64, optional, tag = "4")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TripDescriptor {
    #[prost(string, optional, tag = "1")]
    pub trip_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub start_date: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub route_id: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StopTimeUpdate {
    #[prost(message, optional, tag = "2")]
    pub arrival: Option<StopTimeEvent>,
    #[prost(message, optional, tag = "3")]
    pub departure: Option<StopTimeEvent>,
    #[prost(uint32, optional, tag = "1")]
    pub stop_sequence: Option<u32>,
    #[prost(string, optional, tag = "4")]
    pub stop_id: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StopTimeEvent {
    #[prost(int32, optional, tag = "1")]
    pub delay: Option<i32>,
    #[prost(int64, optional, tag = "2")]
    pub time: Option<i64>,
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn arrival_at(stop_id: &str, secs: i64) -> StopTimeUpdate {
    StopTimeUpdate {
        stop_id: Some(stop_id.to_string()),
        arrival: Some(StopTimeEvent {
            delay: None,
            time: Some(secs),
        }),
        ..Default::default()
    }
}

pub fn trip(trip_id: &str, route_id: &str, stops: Vec<StopTimeUpdate>) -> FeedEntity {
    FeedEntity {
        id: trip_id.to_string(),
        is_deleted: None,
        trip_update: Some(TripUpdate {
            trip: Some(TripDescriptor {
                trip_id: Some(trip_id.to_string()),
                start_date: None,
                route_id: Some(route_id.to_string()),
            }),
            stop_time_update: stops,
            timestamp: None,
        }),
    }
}

pub fn encode_feed(entity: Vec<FeedEntity>) -> Vec<u8> {
    FeedMessage {
        header: Some(FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp: Some(1_700_000_000),
        }),
        entity,
    }
    .encode_to_vec()
}

pub fn station(id: &str, name: &str, latitude: f64, longitude: f64, lines: &[&str]) -> Station {
    Station {
        id: id.to_string(),
        name: name.to_string(),
        latitude,
        longitude,
        lines: lines.iter().map(|l| l.to_string()).collect(),
    }
}

/// A handful of Manhattan stations with directional child stops.
pub fn sample_index() -> StationIndex {
    let stations = vec![
        station("635", "14 St-Union Sq", 40.734673, -73.989951, &["4", "5", "6"]),
        station("R20", "14 St-Union Sq", 40.735736, -73.990568, &["N", "Q", "R", "W"]),
        station("L03", "14 St-Union Sq", 40.734789, -73.990730, &["L"]),
        station("631", "Grand Central-42 St", 40.751776, -73.976848, &["4", "5", "6"]),
        station("640", "Brooklyn Bridge-City Hall", 40.713065, -74.004131, &["4", "5", "6"]),
        station("R14", "14 St", 40.737826, -74.000201, &["F", "M"]),
    ];

    let mut stop_parent = HashMap::new();
    for id in ["635", "R20", "L03", "631", "640", "R14"] {
        stop_parent.insert(id.to_string(), id.to_string());
        for suffix in ["N", "S"] {
            stop_parent.insert(format!("{id}{suffix}"), id.to_string());
        }
    }

    StationIndex::new(stations, stop_parent)
}

/// Serves canned feed payloads. Feeds without a payload come back empty.
#[derive(Default)]
pub struct FakeTransport {
    feeds: BTreeMap<FeedSource, Result<Vec<u8>, u16>>,
    delays: BTreeMap<FeedSource, Duration>,
    requested: Mutex<Vec<FeedSource>>,
}

impl FakeTransport {
    pub fn with(mut self, feed: FeedSource, bytes: Vec<u8>) -> Self {
        self.feeds.insert(feed, Ok(bytes));
        self
    }

    pub fn failing(mut self, feed: FeedSource, status: u16) -> Self {
        self.feeds.insert(feed, Err(status));
        self
    }

    pub fn delayed(mut self, feed: FeedSource, delay: Duration) -> Self {
        self.delays.insert(feed, delay);
        self
    }

    /// Every fetch so far, in call order.
    pub fn requested(&self) -> Vec<FeedSource> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedTransport for FakeTransport {
    async fn fetch_feed(&self, feed: FeedSource) -> Result<Bytes, FetchError> {
        self.requested.lock().unwrap().push(feed);
        if let Some(delay) = self.delays.get(&feed) {
            tokio::time::sleep(*delay).await;
        }
        match self.feeds.get(&feed) {
            Some(Ok(bytes)) => Ok(Bytes::from(bytes.clone())),
            Some(Err(status)) => Err(FetchError::HttpStatus(*status)),
            None => Ok(Bytes::new()),
        }
    }
}

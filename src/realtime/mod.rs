//! Nearby-arrivals aggregation: fetch the feeds a set of stations needs,
//! reduce them into per-station arrivals, then overlay alerts and fold
//! co-named platforms together.

mod collect;
mod merge;
mod overlay;

pub use collect::{
    MAX_ARRIVALS, Predictions, STALE_AFTER_SECS, Targets, destination_label, ordered_stop_updates,
    sort_line_arrivals,
};
pub use merge::merge_stations;
pub use overlay::overlay_alerts;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{FetchError, Result};
use crate::feeds::{FeedSource, feeds_for_lines};
use crate::fetch::FeedTransport;
use crate::models::{ServiceAlert, StationDistance, StationRealtime};
use crate::parser::{TripUpdate, parse_feed};
use crate::stations::{MIN_INCLUSION_RADIUS, StationIndex};

/// Radius used to fold co-named stations for a query of `max_distance` metres.
pub fn inclusion_radius(max_distance: f64) -> f64 {
    max_distance.max(MIN_INCLUSION_RADIUS)
}

/// Fetches and reduces realtime arrivals for a set of nearby stations.
#[derive(Clone)]
pub struct RealtimeService {
    transport: Arc<dyn FeedTransport>,
    index: Arc<StationIndex>,
}

impl RealtimeService {
    pub fn new(transport: Arc<dyn FeedTransport>, index: Arc<StationIndex>) -> Self {
        Self { transport, index }
    }

    pub fn index(&self) -> &Arc<StationIndex> {
        &self.index
    }

    /// Arrivals for every station in `stations`, in input order.
    ///
    /// Every required feed is fetched concurrently and decoded in its own
    /// task. The first failed fetch aborts the rest and fails the run.
    /// Dropping the returned future cancels all in-flight fetches.
    #[tracing::instrument(skip_all, fields(stations = stations.len()))]
    pub async fn fetch_realtime(
        &self,
        stations: &[StationDistance],
        now: DateTime<Utc>,
    ) -> Result<Vec<StationRealtime>> {
        let targets = Targets::new(stations.iter().map(|s| &s.station));
        let feeds = feeds_for_lines(targets.lines.iter().map(String::as_str));

        if feeds.is_empty() {
            debug!("No realtime feeds cover the nearby lines");
            return Ok(stations
                .iter()
                .map(|s| StationRealtime {
                    station: s.station.clone(),
                    distance: s.distance,
                    line_arrivals: Vec::new(),
                })
                .collect());
        }

        info!(feeds = feeds.len(), "Fetching realtime feeds");

        let mut set: JoinSet<std::result::Result<(FeedSource, Vec<TripUpdate>), FetchError>> =
            JoinSet::new();
        for feed in feeds {
            let transport = Arc::clone(&self.transport);
            set.spawn(async move {
                let bytes = transport.fetch_feed(feed).await?;
                let trip_updates = parse_feed(&bytes);
                debug!(%feed, bytes = bytes.len(), trip_updates = trip_updates.len(), "Feed decoded");
                Ok((feed, trip_updates))
            });
        }

        // Dropping the set on an early return aborts the remaining tasks.
        let mut decoded = Vec::new();
        while let Some(joined) = set.join_next().await {
            decoded.push(joined??);
        }
        decoded.sort_by_key(|(feed, _)| *feed);

        let mut predictions = Predictions::default();
        for (_, trip_updates) in &decoded {
            predictions.absorb(trip_updates, &targets, &self.index);
        }

        Ok(stations
            .iter()
            .map(|s| StationRealtime {
                station: s.station.clone(),
                distance: s.distance,
                line_arrivals: predictions.station_arrivals(&s.station, now),
            })
            .collect())
    }
}

/// Final result of one run: stations sorted by distance, plus the alerts
/// that ended up attached to at least one of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub stations: Vec<StationRealtime>,
    pub alerts: Vec<ServiceAlert>,
}

/// Overlays the alerts active at `now` onto each physical station, then
/// merges co-named stations within `inclusion_radius` of each other.
pub fn summarize(
    realtime: Vec<StationRealtime>,
    alerts: &[ServiceAlert],
    index: &StationIndex,
    inclusion_radius: f64,
    now: DateTime<Utc>,
) -> Summary {
    let active: Vec<&ServiceAlert> = alerts.iter().filter(|a| a.is_active_at(now)).collect();
    let (stations, attached) = overlay_alerts(realtime, &active, index);

    Summary {
        stations: merge_stations(stations, inclusion_radius),
        alerts: attached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::ActivePeriod;
    use crate::test_utils::{FakeTransport, arrival_at, encode_feed, sample_index, trip, ts};

    fn nearby(index: &StationIndex, ids: &[(&str, f64)]) -> Vec<StationDistance> {
        ids.iter()
            .map(|(id, distance)| StationDistance {
                station: index.station(id).unwrap().clone(),
                distance: *distance,
            })
            .collect()
    }

    fn union_sq_feeds() -> FakeTransport {
        FakeTransport::default()
            .with(
                FeedSource::Numbered,
                encode_feed(vec![
                    trip("6-1", "6", vec![arrival_at("635S", 1_120), arrival_at("640S", 1_600)]),
                    trip("6-2", "6", vec![arrival_at("635S", 1_060), arrival_at("640S", 1_500)]),
                ]),
            )
            .with(
                FeedSource::Nqrw,
                encode_feed(vec![trip("q-1", "Q", vec![arrival_at("R20N", 1_300)])]),
            )
            .with(FeedSource::L, vec![0xff, 0xff, 0xff])
    }

    #[tokio::test]
    async fn test_fetch_realtime_fans_out_to_needed_feeds() {
        let index = Arc::new(sample_index());
        let transport = Arc::new(union_sq_feeds());
        let service = RealtimeService::new(transport.clone(), index.clone());
        let stations = nearby(&index, &[("L03", 40.0), ("635", 60.0), ("R20", 120.0)]);

        let realtime = service.fetch_realtime(&stations, ts(1_000)).await.unwrap();

        let mut requested = transport.requested();
        requested.sort();
        assert_eq!(requested, vec![FeedSource::Nqrw, FeedSource::L, FeedSource::Numbered]);

        let ids: Vec<_> = realtime.iter().map(|s| s.station.id.as_str()).collect();
        assert_eq!(ids, vec!["L03", "635", "R20"]);

        // unreadable L feed leaves the line listed without arrivals
        assert_eq!(realtime[0].line_arrivals.len(), 1);
        assert!(realtime[0].line_arrivals[0].arrivals.is_empty());

        let six = realtime[1].line_arrivals.iter().find(|a| a.line == "6").unwrap();
        assert_eq!(six.destination.as_deref(), Some("Brooklyn Bridge-City Hall"));
        assert_eq!(six.arrivals, vec![ts(1_060), ts(1_120)]);
    }

    #[tokio::test]
    async fn test_single_feed_failure_fails_the_run() {
        let index = Arc::new(sample_index());
        let transport = union_sq_feeds().failing(FeedSource::Nqrw, 503);
        let service = RealtimeService::new(Arc::new(transport), index.clone());
        let stations = nearby(&index, &[("635", 60.0), ("R20", 120.0)]);

        let err = service.fetch_realtime(&stations, ts(1_000)).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Fetch(FetchError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_no_tracked_lines_skips_fetching() {
        let mut index_stations = vec![crate::test_utils::station(
            "X1",
            "Heritage Trolley",
            40.7,
            -73.9,
            &["TROLLEY"],
        )];
        index_stations.extend(sample_index().stations().iter().cloned());
        let index = Arc::new(StationIndex::new(index_stations, Default::default()));
        let transport = Arc::new(FakeTransport::default());
        let service = RealtimeService::new(transport.clone(), index.clone());

        let realtime = service
            .fetch_realtime(&nearby(&index, &[("X1", 10.0)]), ts(0))
            .await
            .unwrap();

        assert_eq!(realtime.len(), 1);
        assert!(realtime[0].line_arrivals.is_empty());
        assert!(transport.requested().is_empty());
    }

    #[tokio::test]
    async fn test_output_does_not_depend_on_completion_order() {
        let index = Arc::new(sample_index());
        let stations = nearby(&index, &[("635", 60.0), ("R20", 120.0), ("L03", 40.0)]);

        let fast = RealtimeService::new(Arc::new(union_sq_feeds()), index.clone());
        let slow_numbered = RealtimeService::new(
            Arc::new(union_sq_feeds().delayed(FeedSource::Numbered, Duration::from_millis(30))),
            index.clone(),
        );

        let first = fast.fetch_realtime(&stations, ts(1_000)).await.unwrap();
        let second = slow_numbered.fetch_realtime(&stations, ts(1_000)).await.unwrap();
        let again = fast.fetch_realtime(&stations, ts(1_000)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_summarize_merges_and_attaches_active_alerts() {
        let index = Arc::new(sample_index());
        let service = RealtimeService::new(Arc::new(union_sq_feeds()), index.clone());
        let stations = nearby(&index, &[("L03", 40.0), ("635", 60.0), ("R20", 120.0), ("R14", 900.0)]);
        let realtime = service.fetch_realtime(&stations, ts(1_000)).await.unwrap();

        let alerts = vec![
            ServiceAlert {
                id: "q-delays".into(),
                title: "Q delays".into(),
                description: None,
                lines: ["Q".to_string()].into(),
                stops: Default::default(),
                alert_type: Some("Delays".into()),
                active_periods: vec![ActivePeriod {
                    start: ts(0),
                    end: None,
                }],
            },
            ServiceAlert {
                id: "expired".into(),
                title: "Old L work".into(),
                description: None,
                lines: ["L".to_string()].into(),
                stops: Default::default(),
                alert_type: None,
                active_periods: vec![ActivePeriod {
                    start: ts(0),
                    end: Some(ts(500)),
                }],
            },
        ];

        let summary = summarize(realtime, &alerts, &index, inclusion_radius(400.0), ts(1_000));

        let ids: Vec<_> = summary.stations.iter().map(|s| s.station.id.as_str()).collect();
        assert_eq!(ids, vec!["L03", "R14"]);

        let union_sq = &summary.stations[0];
        assert_eq!(union_sq.distance, 40.0);
        assert_eq!(
            union_sq.station.lines,
            vec!["4", "5", "6", "L", "N", "Q", "R", "W"]
        );
        assert!(union_sq.line_arrivals.iter().all(|a| union_sq.station.serves(&a.line)));

        let q = union_sq.line_arrivals.iter().find(|a| a.line == "Q").unwrap();
        assert_eq!(q.arrivals, vec![ts(1_300)]);
        assert_eq!(q.alerts.len(), 1);

        let attached: Vec<_> = summary.alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(attached, vec!["q-delays"]);
    }

    #[test]
    fn test_inclusion_radius_has_a_floor() {
        assert_eq!(inclusion_radius(100.0), MIN_INCLUSION_RADIUS);
        assert_eq!(inclusion_radius(1_600.0), 1_600.0);
    }
}

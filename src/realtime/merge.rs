//! Folds stations that are really one complex (same display name, close
//! together) into a single [`StationRealtime`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;

use super::collect::{MAX_ARRIVALS, sort_line_arrivals};
use super::overlay::sorted_by_title;
use crate::models::{LineArrival, ServiceAlert, Station, StationRealtime};

#[derive(Default)]
struct LineAggregate {
    arrivals: BTreeSet<DateTime<Utc>>,
    alerts: BTreeMap<String, ServiceAlert>,
}

impl LineAggregate {
    fn absorb(&mut self, arrival: &LineArrival) {
        self.arrivals.extend(arrival.arrivals.iter().copied());
        self.absorb_alerts(arrival.alerts.iter());
    }

    fn absorb_alerts<'a>(&mut self, alerts: impl Iterator<Item = &'a ServiceAlert>) {
        for alert in alerts {
            self.alerts
                .entry(alert.id.clone())
                .or_insert_with(|| alert.clone());
        }
    }
}

/// Merges co-named stations lying within `inclusion_radius` metres of the
/// nearest member of their group.
///
/// The merged station keeps the identity and position of its nearest member,
/// serves the union of all lines, and unions arrivals and alerts per line and
/// destination, capped again at [`MAX_ARRIVALS`].
pub fn merge_stations(stations: Vec<StationRealtime>, inclusion_radius: f64) -> Vec<StationRealtime> {
    let by_name = stations.into_iter().into_group_map_by(|s| s.station.name.clone());

    by_name
        .into_values()
        .flat_map(|group| cluster(group, inclusion_radius))
        .map(merge_cluster)
        .sorted_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.station.id.cmp(&b.station.id))
        })
        .collect()
}

fn cluster(mut group: Vec<StationRealtime>, inclusion_radius: f64) -> Vec<Vec<StationRealtime>> {
    group.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.station.id.cmp(&b.station.id))
    });

    let mut clusters: Vec<Vec<StationRealtime>> = Vec::new();
    for entry in group {
        let position = entry.station.coordinate();
        let home = clusters
            .iter_mut()
            .find(|c| c[0].station.coordinate().distance_to(&position) <= inclusion_radius);

        match home {
            Some(members) => members.push(entry),
            None => clusters.push(vec![entry]),
        }
    }
    clusters
}

fn merge_cluster(members: Vec<StationRealtime>) -> StationRealtime {
    let nearest = &members[0];

    let lines: Vec<String> = members
        .iter()
        .flat_map(|m| m.station.lines.iter().cloned())
        .unique()
        .sorted_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)))
        .collect();

    let mut aggregates: BTreeMap<(String, Option<String>), LineAggregate> = BTreeMap::new();
    for arrival in members.iter().flat_map(|m| &m.line_arrivals) {
        aggregates
            .entry((arrival.line.clone(), arrival.destination.clone()))
            .or_default()
            .absorb(arrival);
    }

    // A placeholder only survives for lines with no destination at all; its
    // alerts move onto the real entries otherwise.
    for line in &lines {
        let placeholder_key = (line.clone(), None);
        let has_destinations = aggregates
            .keys()
            .any(|(l, d)| l == line && d.is_some());

        if has_destinations {
            if let Some(placeholder) = aggregates.remove(&placeholder_key) {
                for ((_, _), aggregate) in aggregates
                    .iter_mut()
                    .filter(|((l, d), _)| l == line && d.is_some())
                {
                    aggregate.absorb_alerts(placeholder.alerts.values());
                }
            }
        } else {
            aggregates.entry(placeholder_key).or_default();
        }
    }

    let mut line_arrivals: Vec<LineArrival> = aggregates
        .into_iter()
        .map(|((line, destination), aggregate)| LineArrival {
            line,
            destination,
            arrivals: aggregate.arrivals.into_iter().take(MAX_ARRIVALS).collect(),
            alerts: sorted_by_title(aggregate.alerts.values()),
        })
        .collect();
    sort_line_arrivals(&mut line_arrivals);

    StationRealtime {
        station: Station {
            id: nearest.station.id.clone(),
            name: nearest.station.name.clone(),
            latitude: nearest.station.latitude,
            longitude: nearest.station.longitude,
            lines,
        },
        distance: nearest.distance,
        line_arrivals,
    }
}

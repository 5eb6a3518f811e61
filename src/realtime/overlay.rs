use std::collections::{BTreeMap, BTreeSet};

use crate::models::{ServiceAlert, StationRealtime};
use crate::stations::StationIndex;

/// Attaches alerts to line arrivals.
///
/// A line arrival gets every alert naming its line plus every alert naming
/// a stop of its station. Returns the decorated stations and the alerts that
/// ended up attached somewhere, sorted by title.
pub fn overlay_alerts(
    stations: Vec<StationRealtime>,
    alerts: &[&ServiceAlert],
    index: &StationIndex,
) -> (Vec<StationRealtime>, Vec<ServiceAlert>) {
    let scoped: Vec<(&ServiceAlert, BTreeSet<String>)> = alerts
        .iter()
        .map(|alert| (*alert, index.parent_station_ids(&alert.stops)))
        .collect();

    let mut attached: BTreeMap<&str, &ServiceAlert> = BTreeMap::new();

    let decorated = stations
        .into_iter()
        .map(|mut station| {
            let station_alerts: Vec<&ServiceAlert> = scoped
                .iter()
                .filter(|(_, parents)| parents.contains(&station.station.id))
                .map(|(alert, _)| *alert)
                .collect();

            for arrival in &mut station.line_arrivals {
                let line = arrival.line.to_uppercase();
                let mut combined: BTreeMap<&str, &ServiceAlert> = alerts
                    .iter()
                    .filter(|alert| alert.lines.contains(&line))
                    .chain(station_alerts.iter())
                    .map(|alert| {
                        let alert: &ServiceAlert = *alert;
                        (alert.id.as_str(), alert)
                    })
                    .collect();

                arrival.alerts = sorted_by_title(combined.values().copied());
                attached.append(&mut combined);
            }

            station
        })
        .collect();

    (decorated, sorted_by_title(attached.into_values()))
}

pub(crate) fn sorted_by_title<'a, I>(alerts: I) -> Vec<ServiceAlert>
where
    I: IntoIterator<Item = &'a ServiceAlert>,
{
    let mut alerts: Vec<ServiceAlert> = alerts.into_iter().cloned().collect();
    alerts.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivePeriod, LineArrival};
    use crate::test_utils::{sample_index, ts};

    fn alert(id: &str, title: &str, lines: &[&str], stops: &[&str]) -> ServiceAlert {
        ServiceAlert {
            id: id.into(),
            title: title.into(),
            description: None,
            lines: lines.iter().map(|l| l.to_string()).collect(),
            stops: stops.iter().map(|s| s.to_string()).collect(),
            alert_type: None,
            active_periods: vec![ActivePeriod {
                start: ts(0),
                end: None,
            }],
        }
    }

    fn realtime(index: &StationIndex, id: &str) -> StationRealtime {
        let station = index.station(id).unwrap().clone();
        StationRealtime {
            line_arrivals: station.lines.iter().map(|l| LineArrival::empty(l.clone())).collect(),
            station,
            distance: 10.0,
        }
    }

    #[test]
    fn test_line_and_stop_alerts_are_combined() {
        let index = sample_index();
        let six = alert("a1", "Delays on the 6", &["6"], &[]);
        let elevator = alert("a2", "Elevator outage", &[], &["635N"]);
        let elsewhere = alert("a3", "Grand Central work", &[], &["631"]);
        let everyone = alert("a4", "All lines", &["4", "5", "6"], &["635S"]);
        let alerts = [&six, &elevator, &elsewhere, &everyone];

        let (stations, attached) = overlay_alerts(vec![realtime(&index, "635")], &alerts, &index);

        let arrivals = &stations[0].line_arrivals;
        let titles = |line: &str| -> Vec<String> {
            arrivals
                .iter()
                .find(|a| a.line == line)
                .unwrap()
                .alerts
                .iter()
                .map(|a| a.title.clone())
                .collect()
        };

        assert_eq!(titles("4"), vec!["All lines", "Elevator outage"]);
        assert_eq!(titles("6"), vec!["All lines", "Delays on the 6", "Elevator outage"]);

        let attached: Vec<_> = attached.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(attached, vec!["a4", "a1", "a2"]);
    }

    #[test]
    fn test_alerts_for_unrelated_lines_are_not_attached() {
        let index = sample_index();
        let l_train = alert("l", "L shutdown", &["L"], &[]);

        let (stations, attached) = overlay_alerts(vec![realtime(&index, "635")], &[&l_train], &index);

        assert!(stations[0].line_arrivals.iter().all(|a| a.alerts.is_empty()));
        assert!(attached.is_empty());
    }
}

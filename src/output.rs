//! Output formatting for the CLI.
//!
//! Text boards for nearby arrivals, JSON serialization, and CSV append for
//! feed inspection records.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::debug;

use crate::models::{LineArrival, StationDistance};
use crate::realtime::Summary;
use crate::snapshot::NearestStationSnapshot;
use crate::stats::FeedStats;

/// Pretty-printed JSON of any result type.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// "120 m" below a kilometre, "1.4 km" above.
pub fn format_distance(metres: f64) -> String {
    if metres < 1000.0 {
        format!("{} m", metres.round() as i64)
    } else {
        format!("{:.1} km", metres / 1000.0)
    }
}

/// Minutes until `arrival`, rounded down; "now" once it is under a minute.
pub fn format_countdown(arrival: DateTime<Utc>, now: DateTime<Utc>) -> String {
    match (arrival - now).num_minutes() {
        m if m <= 0 => "now".to_string(),
        m => format!("{m} min"),
    }
}

fn format_arrivals(arrival: &LineArrival, now: DateTime<Utc>) -> String {
    if arrival.arrivals.is_empty() {
        return "no arrivals".to_string();
    }
    arrival
        .arrivals
        .iter()
        .map(|t| format_countdown(*t, now))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The arrivals board: one block per station, then the alert list.
pub fn render_summary(summary: &Summary, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    for station in &summary.stations {
        let _ = writeln!(
            out,
            "{} ({})",
            station.station.name,
            format_distance(station.distance)
        );
        for arrival in &station.line_arrivals {
            let destination = arrival.destination.as_deref().unwrap_or("-");
            let _ = writeln!(
                out,
                "  {:<3} {:<32} {}",
                arrival.line,
                destination,
                format_arrivals(arrival, now)
            );
            for alert in &arrival.alerts {
                let _ = writeln!(out, "      ! {}", alert.title);
            }
        }
        out.push('\n');
    }

    if !summary.alerts.is_empty() {
        out.push_str("Alerts:\n");
        for alert in &summary.alerts {
            let lines: Vec<&str> = alert.lines.iter().map(String::as_str).collect();
            match &alert.alert_type {
                Some(kind) => {
                    let _ = writeln!(out, "  [{kind}] {} ({})", alert.title, lines.join(" "));
                }
                None => {
                    let _ = writeln!(out, "  {} ({})", alert.title, lines.join(" "));
                }
            }
        }
    }

    out
}

pub fn render_stations(stations: &[StationDistance]) -> String {
    let mut out = String::new();
    for s in stations {
        let _ = writeln!(
            out,
            "{:<6} {:<36} {:>8}  {}",
            s.station.id,
            s.station.name,
            format_distance(s.distance),
            s.station.lines.join(" ")
        );
    }
    out
}

pub fn render_snapshot(snapshot: &NearestStationSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();
    let distance = snapshot
        .distance
        .map(|d| format!(" ({})", format_distance(d)))
        .unwrap_or_default();
    let _ = writeln!(out, "{}{distance}", snapshot.station_name);

    for line in &snapshot.lines {
        let arrivals = if line.arrivals.is_empty() {
            "no arrivals".to_string()
        } else {
            line.arrivals
                .iter()
                .map(|t| format_countdown(*t, now))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let _ = writeln!(out, "  {:<3} {arrivals}", line.id);
    }
    let _ = writeln!(out, "Updated {}", snapshot.last_updated.to_rfc3339());
    out
}

/// Appends a [`FeedStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, feed_stats: &FeedStats) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(feed_stats)?;
    writer.flush()?;

    Ok(())
}

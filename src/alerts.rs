//! Subway service alerts from the MTA JSON alert feed.
//!
//! The feed is the JSON rendering of GTFS-RT alerts with the MTA
//! `transit_realtime.mercury_alert` extension carrying a category.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AlertError;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::models::{ActivePeriod, ServiceAlert};

pub const DEFAULT_ALERTS_URL: &str =
    "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/camsys%2Fsubway-alerts.json";

pub const ALERTS_TIMEOUT: Duration = Duration::from_secs(20);

const DEFAULT_TITLE: &str = "Service Alert";

/// Source of the current alert list.
#[async_trait]
pub trait AlertSource: Send + Sync {
    async fn fetch_alerts(&self) -> Result<Vec<ServiceAlert>, AlertError>;
}

/// Fetches alerts over HTTP.
pub struct AlertService<C> {
    client: C,
    url: String,
    timeout: Duration,
}

impl<C: HttpClient> AlertService<C> {
    pub fn new(client: C, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: ALERTS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<C: HttpClient> AlertSource for AlertService<C> {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch_alerts(&self) -> Result<Vec<ServiceAlert>, AlertError> {
        let bytes = fetch_bytes(&self.client, &self.url, self.timeout).await?;
        let alerts = parse_alerts(&bytes)?;
        info!(alerts = alerts.len(), "Service alerts fetched");
        Ok(alerts)
    }
}

/// Decodes the alert document into [`ServiceAlert`]s.
///
/// Route ids are upper-cased. Entities without an alert body are skipped.
pub fn parse_alerts(bytes: &[u8]) -> Result<Vec<ServiceAlert>, AlertError> {
    let feed: AlertFeed = serde_json::from_slice(bytes)?;
    let total = feed.entity.len();

    let alerts: Vec<ServiceAlert> = feed
        .entity
        .into_iter()
        .filter_map(AlertEntity::into_service_alert)
        .collect();

    if alerts.len() != total {
        debug!(skipped = total - alerts.len(), "Entities without an alert body");
    }
    Ok(alerts)
}

#[derive(Deserialize)]
struct AlertFeed {
    #[serde(default)]
    entity: Vec<AlertEntity>,
}

#[derive(Deserialize)]
struct AlertEntity {
    id: String,
    alert: Option<AlertBody>,
}

impl AlertEntity {
    fn into_service_alert(self) -> Option<ServiceAlert> {
        let alert = self.alert?;

        let lines: BTreeSet<String> = alert
            .informed_entity
            .iter()
            .filter_map(|e| e.route_id.as_deref())
            .map(str::to_uppercase)
            .collect();
        let stops: BTreeSet<String> = alert
            .informed_entity
            .iter()
            .filter_map(|e| e.stop_id.clone())
            .collect();

        let active_periods = alert
            .active_period
            .iter()
            .map(|p| ActivePeriod {
                start: p.start.and_then(epoch).unwrap_or(DateTime::UNIX_EPOCH),
                end: p.end.and_then(epoch),
            })
            .collect();

        Some(ServiceAlert {
            id: self.id,
            title: alert
                .header_text
                .as_ref()
                .and_then(Translated::text)
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            description: alert
                .description_text
                .as_ref()
                .and_then(Translated::text)
                .map(str::to_string),
            lines,
            stops,
            alert_type: alert.mercury_alert.and_then(|m| m.alert_type),
            active_periods,
        })
    }
}

fn epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[derive(Deserialize)]
struct AlertBody {
    #[serde(default)]
    active_period: Vec<Period>,
    #[serde(default)]
    informed_entity: Vec<InformedEntity>,
    header_text: Option<Translated>,
    description_text: Option<Translated>,
    #[serde(rename = "transit_realtime.mercury_alert")]
    mercury_alert: Option<MercuryAlert>,
}

#[derive(Deserialize)]
struct Period {
    start: Option<i64>,
    end: Option<i64>,
}

#[derive(Deserialize)]
struct InformedEntity {
    route_id: Option<String>,
    stop_id: Option<String>,
}

#[derive(Deserialize)]
struct Translated {
    #[serde(default)]
    translation: Vec<Translation>,
}

impl Translated {
    /// The English entry, else the first one.
    fn text(&self) -> Option<&str> {
        self.translation
            .iter()
            .find(|t| t.language.as_deref() == Some("en"))
            .or_else(|| self.translation.first())
            .map(|t| t.text.as_str())
    }
}

#[derive(Deserialize)]
struct Translation {
    text: String,
    language: Option<String>,
}

#[derive(Deserialize)]
struct MercuryAlert {
    alert_type: Option<String>,
}

//! Refresh controller for the nearby-arrivals view.
//!
//! A [`Dashboard`] owns one in-flight run at a time plus two repeating
//! tickers: an auto-refresh and a relative "updated N min ago" label. State
//! is published through a [`watch`] channel so any number of renderers can
//! follow it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::alerts::AlertSource;
use crate::error::{Error, Result};
use crate::location::LocationProvider;
use crate::models::{ServiceAlert, StationRealtime};
use crate::realtime::{RealtimeService, Summary, inclusion_radius, summarize};
use crate::snapshot::{NearestStationSnapshot, SnapshotStore};

pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_MAX_DISTANCE: f64 = 1600.0;
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RELATIVE_INTERVAL: Duration = Duration::from_secs(60);

pub const NO_STATIONS_MESSAGE: &str = "No arrivals found nearby. Try refreshing.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error(String),
}

impl Phase {
    /// Idle and settled phases only move to Loading; Loading only settles.
    pub fn can_transition_to(&self, next: &Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle | Phase::Ready | Phase::Error(_), Phase::Loading)
                | (Phase::Loading, Phase::Ready | Phase::Error(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DashboardSettings {
    pub limit: usize,
    pub max_distance: f64,
    pub refresh_interval: Duration,
    pub relative_interval: Duration,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            max_distance: DEFAULT_MAX_DISTANCE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            relative_interval: DEFAULT_RELATIVE_INTERVAL,
        }
    }
}

impl DashboardSettings {
    /// Falling back to the nearest stations past the radius only makes sense
    /// for the default radius or wider.
    pub fn allow_fallback(&self) -> bool {
        self.max_distance >= DEFAULT_MAX_DISTANCE
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub phase: Phase,
    pub stations: Vec<StationRealtime>,
    pub alerts: Vec<ServiceAlert>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_updated_relative: String,
}

impl DashboardState {
    fn transition(&mut self, next: Phase) {
        if self.phase.can_transition_to(&next) {
            self.phase = next;
        } else {
            warn!(from = ?self.phase, to = ?next, "Ignoring illegal phase transition");
        }
    }
}

/// "just now", "5 min ago", "2 hrs ago", ...
pub fn relative_label(elapsed: TimeDelta) -> String {
    let secs = elapsed.num_seconds().max(0);
    match secs {
        0..30 => "just now".to_string(),
        30..90 => "1 min ago".to_string(),
        90..3_600 => format!("{} min ago", secs / 60),
        3_600..86_400 => match secs / 3_600 {
            1 => "1 hr ago".to_string(),
            hours => format!("{hours} hrs ago"),
        },
        _ => match secs / 86_400 {
            1 => "1 day ago".to_string(),
            days => format!("{days} days ago"),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Tasks {
    /// Bumped by every refresh; a run only publishes if it is still current.
    generation: u64,
    run: Option<JoinHandle<()>>,
    auto_refresh: Option<JoinHandle<()>>,
    relative: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [self.run.take(), self.auto_refresh.take(), self.relative.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

struct Inner {
    location: Arc<dyn LocationProvider>,
    realtime: RealtimeService,
    alerts: Arc<dyn AlertSource>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    settings: Mutex<DashboardSettings>,
    state: watch::Sender<DashboardState>,
    tasks: Mutex<Tasks>,
}

pub struct Dashboard {
    inner: Arc<Inner>,
}

impl Dashboard {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        realtime: RealtimeService,
        alerts: Arc<dyn AlertSource>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
        settings: DashboardSettings,
    ) -> Self {
        let (state, _) = watch::channel(DashboardState::default());
        Self {
            inner: Arc::new(Inner {
                location,
                realtime,
                alerts,
                snapshots,
                settings: Mutex::new(settings),
                state,
                tasks: Mutex::new(Tasks::default()),
            }),
        }
    }

    pub fn state(&self) -> DashboardState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.inner.state.subscribe()
    }

    pub fn settings(&self) -> DashboardSettings {
        *lock(&self.inner.settings)
    }

    /// Kicks off the first run. Does nothing once the dashboard has left
    /// [`Phase::Idle`].
    pub fn start(&self) {
        let idle = self.inner.state.borrow().phase == Phase::Idle;
        if idle {
            self.inner.refresh(false);
        }
    }

    /// Starts a new run, cancelling any run still in flight.
    pub fn refresh(&self) {
        self.inner.refresh(false);
    }

    /// Like [`Dashboard::refresh`] but the current stations stay visible
    /// while the run is loading.
    pub fn refresh_silently(&self) {
        self.inner.refresh(true);
    }

    /// Updates the search radius. Negative values clamp to zero; a change
    /// triggers a refresh.
    pub fn set_max_distance(&self, max_distance: f64) {
        let max_distance = max_distance.max(0.0);
        {
            let mut settings = lock(&self.inner.settings);
            if settings.max_distance == max_distance {
                return;
            }
            settings.max_distance = max_distance;
        }
        self.inner.refresh(false);
    }

    /// Cancels the in-flight run and both tickers.
    pub fn stop(&self) {
        lock(&self.inner.tasks).abort_all();
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn refresh(self: &Arc<Self>, silently: bool) {
        let mut tasks = lock(&self.tasks);
        tasks.generation += 1;
        let generation = tasks.generation;
        if let Some(previous) = tasks.run.take() {
            previous.abort();
        }

        self.state.send_modify(|state| {
            if state.phase != Phase::Loading {
                state.transition(Phase::Loading);
            }
            if !silently {
                state.stations.clear();
                state.alerts.clear();
            }
        });

        let settings = *lock(&self.settings);
        let inner = Arc::clone(self);
        tasks.run = Some(tokio::spawn(async move {
            let result = inner.load(settings).await;
            inner.finish(generation, result);
        }));
    }

    #[tracing::instrument(skip(self, settings), fields(limit = settings.limit, max_distance = settings.max_distance))]
    async fn load(&self, settings: DashboardSettings) -> Result<Summary> {
        let here = self.location.request_location().await?;
        let index = self.realtime.index();

        let nearby = index.nearest_stations(
            here,
            settings.limit,
            settings.max_distance,
            settings.allow_fallback(),
        );
        debug!(stations = nearby.len(), "Nearby stations resolved");

        let now = Utc::now();
        let (realtime, alerts) = tokio::try_join!(
            self.realtime.fetch_realtime(&nearby, now),
            async { self.alerts.fetch_alerts().await.map_err(Error::from) },
        )?;

        Ok(summarize(
            realtime,
            &alerts,
            index,
            inclusion_radius(settings.max_distance),
            now,
        ))
    }

    fn finish(self: &Arc<Self>, generation: u64, result: Result<Summary>) {
        let finished_at = Utc::now();

        let mut tasks = lock(&self.tasks);
        if tasks.generation != generation {
            debug!(generation, "Discarding superseded run");
            return;
        }
        tasks.run = None;

        if let (Ok(summary), Some(store)) = (&result, &self.snapshots) {
            if let Some(nearest) = summary.stations.first() {
                let snapshot = NearestStationSnapshot::from_station(nearest, finished_at);
                if let Err(e) = store.save(&snapshot) {
                    warn!(error = %e, "Failed to save snapshot");
                }
            }
        }

        match result {
            Ok(summary) => {
                info!(
                    stations = summary.stations.len(),
                    alerts = summary.alerts.len(),
                    "Dashboard refreshed"
                );
                self.state.send_modify(|state| {
                    let next = if summary.stations.is_empty() {
                        Phase::Error(NO_STATIONS_MESSAGE.to_string())
                    } else {
                        Phase::Ready
                    };
                    state.stations = summary.stations;
                    state.alerts = summary.alerts;
                    state.last_updated = Some(finished_at);
                    state.last_updated_relative = relative_label(TimeDelta::zero());
                    state.transition(next);
                });

                self.start_relative_timer(&mut tasks);
                self.start_auto_refresh(&mut tasks);
            }
            Err(e) => {
                warn!(error = %e, "Dashboard refresh failed");
                self.state
                    .send_modify(|state| state.transition(Phase::Error(e.to_string())));
            }
        }
    }

    fn start_relative_timer(self: &Arc<Self>, tasks: &mut Tasks) {
        let period = lock(&self.settings).relative_interval;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = Weak::upgrade(&weak) else {
                    break;
                };
                inner.state.send_modify(|state| {
                    if let Some(last) = state.last_updated {
                        state.last_updated_relative = relative_label(Utc::now() - last);
                    }
                });
            }
        });
        if let Some(previous) = tasks.relative.replace(handle) {
            previous.abort();
        }
    }

    fn start_auto_refresh(self: &Arc<Self>, tasks: &mut Tasks) {
        let period = lock(&self.settings).refresh_interval;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let Some(inner) = Weak::upgrade(&weak) else {
                    break;
                };
                debug!("Auto refresh");
                inner.refresh(true);
            }
        });
        if let Some(previous) = tasks.auto_refresh.replace(handle) {
            previous.abort();
        }
    }
}

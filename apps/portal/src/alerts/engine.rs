use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use urbanshield_common::Hazard;

use super::fanout::{alert_body, alert_title, AlertBroadcast, ProximityAlert};
use super::notifier::{NotificationPermission, Notifier};
use super::seen::{identity_key, SeenAlertSet};
use crate::api::PortalApi;
use crate::location::{LocationError, LocationSource, WatchOptions};

/// Minimum spacing between hazard queries.
pub const QUERY_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_RADIUS_KM: f64 = 7.0;

struct EngineRun {
    task: JoinHandle<()>,
    seen: Arc<Mutex<SeenAlertSet>>,
    radius_km: f64,
}

/// Watches the device position and notifies once per hazard discovered
/// within the radius.
pub struct ProximityAlertEngine {
    source: Arc<dyn LocationSource>,
    api: PortalApi,
    notifier: Arc<dyn Notifier>,
    alerts: AlertBroadcast,
    permission_asked: Arc<AtomicBool>,
    run: Mutex<Option<EngineRun>>,
}

impl ProximityAlertEngine {
    pub fn new(
        source: Arc<dyn LocationSource>,
        api: PortalApi,
        notifier: Arc<dyn Notifier>,
        alerts: AlertBroadcast,
    ) -> Self {
        Self {
            source,
            api,
            notifier,
            alerts,
            permission_asked: Arc::new(AtomicBool::new(false)),
            run: Mutex::new(None),
        }
    }

    /// Start (or re-aim) the engine. A running engine given the same radius
    /// is left alone; a new radius restarts the watch but keeps the alerts
    /// already raised in this run.
    pub fn start(&self, enabled: bool, radius_km: f64) {
        if !enabled {
            self.stop();
            return;
        }

        let mut run = self.run.lock();
        let seen = match run.take() {
            Some(active) if !active.task.is_finished() => {
                if active.radius_km == radius_km {
                    *run = Some(active);
                    return;
                }
                active.task.abort();
                tracing::info!(radius_km, "proximity radius changed");
                active.seen
            }
            _ => Arc::new(Mutex::new(SeenAlertSet::new())),
        };

        let watch = self.source.watch(WatchOptions::HIGH_ACCURACY);
        let worker = Worker {
            api: self.api.clone(),
            notifier: self.notifier.clone(),
            alerts: self.alerts.clone(),
            permission_asked: self.permission_asked.clone(),
            seen: seen.clone(),
            radius_km,
        };
        let task = tokio::spawn(async move {
            worker.run(watch).await;
        });
        *run = Some(EngineRun {
            task,
            seen,
            radius_km,
        });
        tracing::info!(radius_km, "proximity alerts started");
    }

    /// Stop watching. The next `start` begins a fresh run.
    pub fn stop(&self) {
        if let Some(run) = self.run.lock().take() {
            run.task.abort();
            tracing::info!(alerted = run.seen.lock().len(), "proximity alerts stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|run| !run.task.is_finished())
    }

    /// Hazards alerted on during the current run.
    pub fn seen_count(&self) -> usize {
        self.run
            .lock()
            .as_ref()
            .map_or(0, |run| run.seen.lock().len())
    }
}

impl Drop for ProximityAlertEngine {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.task.abort();
        }
    }
}

struct Worker {
    api: PortalApi,
    notifier: Arc<dyn Notifier>,
    alerts: AlertBroadcast,
    permission_asked: Arc<AtomicBool>,
    seen: Arc<Mutex<SeenAlertSet>>,
    radius_km: f64,
}

impl Worker {
    /// The permission prompt runs alongside the watch; until it is answered
    /// alerts fall back to in-app toasts.
    async fn run(self, watch: crate::location::LocationWatch) {
        tokio::join!(self.maybe_request_permission(), self.watch_hazards(watch));
    }

    async fn watch_hazards(&self, mut watch: crate::location::LocationWatch) {
        let mut last_query: Option<Instant> = None;
        while let Some(update) = watch.next().await {
            let position = match update {
                Ok(position) => position,
                Err(LocationError::Timeout) => {
                    tracing::debug!("no location fix for proximity alerts");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(%err, "geolocation error for proximity alerts");
                    continue;
                }
            };

            let now = Instant::now();
            if last_query.is_some_and(|at| now.duration_since(at) < QUERY_INTERVAL) {
                continue;
            }
            last_query = Some(now);

            match self
                .api
                .hazards_near(position.coordinates(), self.radius_km)
                .await
            {
                Ok(hazards) => self.raise(&hazards),
                Err(err) => tracing::warn!(%err, "proximity alert fetch failed"),
            }
        }
    }

    async fn maybe_request_permission(&self) {
        if self.notifier.permission() != NotificationPermission::Default {
            return;
        }
        if self.permission_asked.swap(true, Ordering::SeqCst) {
            return;
        }
        let answer = self.notifier.request_permission().await;
        tracing::debug!(%answer, "notification permission answered");
    }

    fn raise(&self, hazards: &[Hazard]) {
        for hazard in hazards {
            if !self.seen.lock().insert(identity_key(hazard)) {
                continue;
            }
            if self.notifier.permission() == NotificationPermission::Granted {
                self.notifier.show(&alert_title(hazard), &alert_body(hazard));
            } else {
                self.alerts.dispatch(ProximityAlert::for_hazard(hazard));
            }
            tracing::info!(id = ?hazard.id, kind = ?hazard.disaster_type, "proximity alert raised");
        }
    }
}

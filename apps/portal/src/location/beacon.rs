//! Reports the device position to the server, at most once per
//! [`REPORT_INTERVAL`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{LocationError, LocationSource, Position, WatchOptions};
use crate::api::PortalApi;

pub const REPORT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Default)]
struct BeaconState {
    latest: Option<Position>,
    /// Instant of the last report attempt. Set on start so the first report
    /// waits a full interval.
    last_attempt: Option<Instant>,
    attempts: u64,
}

pub struct GeoPresenceBeacon {
    source: Arc<dyn LocationSource>,
    api: PortalApi,
    state: Arc<Mutex<BeaconState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GeoPresenceBeacon {
    pub fn new(source: Arc<dyn LocationSource>, api: PortalApi) -> Self {
        Self {
            source,
            api,
            state: Arc::new(Mutex::new(BeaconState::default())),
            task: Mutex::new(None),
        }
    }

    /// Begin tracking. Calling it while already running is a no-op;
    /// `start(false)` is the same as [`stop`](Self::stop).
    pub fn start(&self, enabled: bool) {
        if !enabled {
            self.stop();
            return;
        }
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let mut watch = self.source.watch(WatchOptions::HIGH_ACCURACY);
        self.state.lock().last_attempt = Some(Instant::now());
        let state = self.state.clone();
        let api = self.api.clone();

        *task = Some(tokio::spawn(async move {
            while let Some(update) = watch.next().await {
                match update {
                    Ok(position) => {
                        if let Some(position) = take_due_report(&state, position) {
                            let api = api.clone();
                            tokio::spawn(async move {
                                if let Err(err) = api.update_location(&position).await {
                                    tracing::warn!(%err, "failed to report location");
                                }
                            });
                        }
                    }
                    Err(LocationError::PermissionDenied) => {
                        tracing::warn!("location permission denied, beacon idle");
                    }
                    Err(LocationError::Timeout) => {
                        tracing::debug!("no location fix within the watch timeout");
                    }
                    Err(err) => tracing::warn!(%err, "location error"),
                }
            }
            tracing::debug!("location source closed, beacon stopped");
        }));
        tracing::info!("geo-presence beacon started");
    }

    /// Stop tracking immediately. Idempotent.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::info!("geo-presence beacon stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn latest_position(&self) -> Option<Position> {
        self.state.lock().latest.clone()
    }

    /// Reports attempted since construction.
    pub fn report_attempts(&self) -> u64 {
        self.state.lock().attempts
    }
}

impl Drop for GeoPresenceBeacon {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Record `position` as latest and return it if a report is due.
fn take_due_report(state: &Mutex<BeaconState>, position: Position) -> Option<Position> {
    let mut state = state.lock();
    state.latest = Some(position.clone());
    let now = Instant::now();
    if let Some(last) = state.last_attempt {
        if now.duration_since(last) < REPORT_INTERVAL {
            return None;
        }
    }
    state.last_attempt = Some(now);
    state.attempts += 1;
    Some(position)
}

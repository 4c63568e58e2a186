//! Device location: the watch abstraction shared by the presence beacon and
//! the proximity alert engine.

pub mod beacon;
pub mod feed;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use urbanshield_common::Coordinates;

pub use beacon::GeoPresenceBeacon;
pub use feed::{parse_feed_line, LocationFeed};

/// One location fix.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Accuracy radius in metres.
    pub accuracy: f64,
    pub observed_at: DateTime<Utc>,
}

impl Position {
    pub fn new(lat: f64, lon: f64, accuracy: f64) -> Self {
        Self {
            lat,
            lon,
            accuracy,
            observed_at: Utc::now(),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("timed out waiting for a location fix")]
    Timeout,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

pub type LocationUpdate = Result<Position, LocationError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// A `Timeout` error is delivered when no fix arrives within this window.
    pub timeout: Duration,
    /// Fixes older than this are skipped.
    pub maximum_age: Duration,
}

impl WatchOptions {
    /// GPS-grade tracking used by both location consumers.
    pub const HIGH_ACCURACY: WatchOptions = WatchOptions {
        high_accuracy: true,
        timeout: Duration::from_secs(10),
        maximum_age: Duration::from_secs(5),
    };
}

/// Something that produces continuous location updates.
pub trait LocationSource: Send + Sync {
    /// Start a watch. Dropping the returned handle unsubscribes.
    fn watch(&self, options: WatchOptions) -> LocationWatch;
}

/// A live subscription to a [`LocationSource`].
pub struct LocationWatch {
    updates: broadcast::Receiver<LocationUpdate>,
    options: WatchOptions,
}

impl LocationWatch {
    pub fn new(updates: broadcast::Receiver<LocationUpdate>, options: WatchOptions) -> Self {
        Self { updates, options }
    }

    pub fn options(&self) -> WatchOptions {
        self.options
    }

    /// The next update, or `None` once the source has shut down.
    pub async fn next(&mut self) -> Option<LocationUpdate> {
        loop {
            let received = tokio::time::timeout(self.options.timeout, self.updates.recv()).await;
            match received {
                Err(_) => return Some(Err(LocationError::Timeout)),
                Ok(Ok(Ok(position))) if self.is_stale(&position) => {
                    tracing::trace!(observed_at = %position.observed_at, "skipping stale fix");
                }
                Ok(Ok(update)) => return Some(update),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "location watch lagged");
                }
                Ok(Err(RecvError::Closed)) => return None,
            }
        }
    }

    fn is_stale(&self, position: &Position) -> bool {
        let age = Utc::now().signed_duration_since(position.observed_at);
        age.to_std()
            .map(|age| age > self.options.maximum_age)
            .unwrap_or(false)
    }
}

//! A broadcast-backed [`LocationSource`] fed by whoever owns the device
//! (stdin in the agent, the test itself in unit tests).

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;

use super::{LocationError, LocationSource, LocationUpdate, LocationWatch, Position, WatchOptions};

const FEED_CAPACITY: usize = 64;

/// Accuracy assumed for feed lines that omit it, in metres.
const DEFAULT_ACCURACY_M: f64 = 10.0;

#[derive(Clone)]
pub struct LocationFeed {
    sender: broadcast::Sender<LocationUpdate>,
}

impl Default for LocationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Deliver an update to every active watch. Returns how many received it.
    pub fn publish(&self, update: LocationUpdate) -> usize {
        self.sender.send(update).unwrap_or(0)
    }

    pub fn publish_position(&self, lat: f64, lon: f64, accuracy: f64) -> usize {
        self.publish(Ok(Position::new(lat, lon, accuracy)))
    }

    pub fn watcher_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish every parseable line from `reader` until EOF.
    pub async fn pump<R>(&self, reader: R) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            match parse_feed_line(&line) {
                Some(update) => {
                    self.publish(update);
                }
                None if line.trim().is_empty() => {}
                None => tracing::warn!(%line, "ignoring unparseable location line"),
            }
        }
        Ok(())
    }
}

impl LocationSource for LocationFeed {
    fn watch(&self, options: WatchOptions) -> LocationWatch {
        LocationWatch::new(self.sender.subscribe(), options)
    }
}

/// Parse one feed line: `lat,lon[,accuracy]`, `denied`, `timeout` or
/// `unavailable[:reason]`.
pub fn parse_feed_line(line: &str) -> Option<LocationUpdate> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => return None,
        "denied" => return Some(Err(LocationError::PermissionDenied)),
        "timeout" => return Some(Err(LocationError::Timeout)),
        _ => {}
    }
    if let Some(reason) = strip_prefix_ignore_case(line, "unavailable") {
        let reason = reason.trim_start_matches(':').trim();
        return Some(Err(LocationError::Unavailable(reason.to_string())));
    }

    let mut parts = line.split(',').map(str::trim);
    let lat: f64 = parts.next()?.parse().ok()?;
    let lon: f64 = parts.next()?.parse().ok()?;
    let accuracy = match parts.next() {
        Some(raw) => raw.parse().ok()?,
        None => DEFAULT_ACCURACY_M,
    };
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    Some(Ok(Position::new(lat, lon, accuracy)))
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &line[prefix.len()..])
}

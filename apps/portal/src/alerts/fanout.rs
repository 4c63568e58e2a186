//! In-app alert channel for when native notifications are unavailable.
//!
//! A single `tokio::sync::broadcast` channel; the presentation layer
//! subscribes and renders each alert as a toast.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use urbanshield_common::id::{prefix, prefixed_ulid};
use urbanshield_common::Hazard;

/// Slow receivers that fall behind skip alerts (RecvError::Lagged).
const ALERT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityAlert {
    /// Client-generated `alr_…` id for toast bookkeeping.
    pub id: String,
    pub title: String,
    pub body: String,
    pub severity: Option<i64>,
    #[serde(rename = "type")]
    pub hazard_type: Option<String>,
    /// The hazard's creation time as reported by the server.
    pub at: Option<String>,
}

impl ProximityAlert {
    pub fn for_hazard(hazard: &Hazard) -> Self {
        Self {
            id: prefixed_ulid(prefix::ALERT),
            title: alert_title(hazard),
            body: alert_body(hazard),
            severity: hazard.severity,
            hazard_type: hazard.disaster_type.clone(),
            at: hazard.created_at.clone(),
        }
    }
}

pub fn alert_title(hazard: &Hazard) -> String {
    let kind = hazard
        .disaster_type
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or("Alert");
    format!("Disaster nearby: {kind}")
}

pub fn alert_body(hazard: &Hazard) -> String {
    let severity = hazard
        .severity
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string());
    let detail = [&hazard.title, &hazard.description]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(String::as_str)
        .unwrap_or("Stay alert.");
    format!("Severity {severity}/10 • {detail}")
}

#[derive(Clone)]
pub struct AlertBroadcast {
    sender: broadcast::Sender<Arc<ProximityAlert>>,
}

impl Default for AlertBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(ALERT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ProximityAlert>> {
        self.sender.subscribe()
    }

    pub fn dispatch(&self, alert: ProximityAlert) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(alert));
    }
}

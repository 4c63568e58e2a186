use std::path::PathBuf;
use std::time::Duration;

use crate::alerts::engine::DEFAULT_RADIUS_KM;
use crate::alerts::NotificationPermission;

/// Portal client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the UrbanShield API (e.g. `http://127.0.0.1:8000/api/`).
    pub api_url: String,
    /// Directory holding the facility GeoJSON documents.
    pub asset_dir: PathBuf,
    /// File backing the durable session store.
    pub state_file: PathBuf,
    /// Radius for proximity alerts, in kilometres.
    pub alert_radius_km: f64,
    /// Report the user's position to the backend.
    pub track_location: bool,
    pub proximity_alerts: bool,
    /// Native notification permission at startup.
    pub notifications: NotificationPermission,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout.
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables. Missing or unparsable
    /// values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            api_url: var("URBANSHIELD_API_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000/api/".to_string()),
            asset_dir: var("URBANSHIELD_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            state_file: var("URBANSHIELD_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".urbanshield/session.json")),
            alert_radius_km: var("URBANSHIELD_ALERT_RADIUS_KM")
                .and_then(|v| v.parse().ok())
                .filter(|radius: &f64| *radius > 0.0)
                .unwrap_or(DEFAULT_RADIUS_KM),
            track_location: var("URBANSHIELD_TRACK_LOCATION")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            proximity_alerts: var("URBANSHIELD_PROXIMITY_ALERTS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            notifications: var("URBANSHIELD_NOTIFICATIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            username: var("URBANSHIELD_USERNAME"),
            password: var("URBANSHIELD_PASSWORD"),
            http_timeout: Duration::from_secs(
                var("URBANSHIELD_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(15),
            ),
        }
    }

    /// Login credentials, when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.username.as_deref()?, self.password.as_deref()?))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

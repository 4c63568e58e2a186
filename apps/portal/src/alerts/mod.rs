//! Proximity alerting: hazards discovered near the user's position become
//! one-time notifications.

pub mod engine;
pub mod fanout;
pub mod notifier;
pub mod seen;

pub use engine::ProximityAlertEngine;
pub use fanout::{AlertBroadcast, ProximityAlert};
pub use notifier::{LogNotifier, NotificationPermission, Notifier};
pub use seen::{identity_key, SeenAlertSet};

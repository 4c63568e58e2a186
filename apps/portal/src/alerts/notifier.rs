use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Native notification permission, mirroring the platform's three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationPermission {
    /// Never asked.
    #[default]
    Default,
    Granted,
    Denied,
}

impl FromStr for NotificationPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "" => Ok(Self::Default),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown notification permission {other:?}")),
        }
    }
}

impl fmt::Display for NotificationPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        })
    }
}

/// Native notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;
    /// Prompt the user. Returns the resulting state.
    async fn request_permission(&self) -> NotificationPermission;
    fn show(&self, title: &str, body: &str);
}

/// Notifier for headless runs: "showing" writes a log line. A prompt is
/// answered with the configured permission.
pub struct LogNotifier {
    permission: Mutex<NotificationPermission>,
    answer: NotificationPermission,
}

impl LogNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        let answer = match permission {
            NotificationPermission::Default => NotificationPermission::Granted,
            other => other,
        };
        Self {
            permission: Mutex::new(permission),
            answer,
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> NotificationPermission {
        *self.permission.lock() = self.answer;
        tracing::info!(permission = %self.answer, "notification permission requested");
        self.answer
    }

    fn show(&self, title: &str, body: &str) {
        tracing::warn!(target: "urbanshield::notify", %title, %body, "notification");
    }
}

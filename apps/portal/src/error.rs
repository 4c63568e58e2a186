use reqwest::StatusCode;
use serde_json::Value;

use crate::storage::StorageError;

/// Failure taxonomy for calls made through the request gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// No response was received (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(String),
    /// The access token was rejected and the refresh attempt failed.
    /// The session has already been cleared when this is returned.
    #[error("session expired")]
    AuthExpired,
    /// A non-2xx response that survived the refresh-and-retry path.
    #[error("server returned {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Server {
        status: StatusCode,
        message: Option<String>,
    },
    /// The caller aborted the request. Never a failure from the caller's view.
    #[error("request canceled")]
    Canceled,
    /// A 2xx response whose body does not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-provided message, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Errors from the login / registration / OAuth flows.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The server refused the credentials; holds the message to display.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to persist session: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised while wiring up a portal context.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to open session store: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Pull a human-readable message out of an error body.
///
/// The backend reports failures as `{"detail": ...}`, `{"error": ...}`,
/// `{"message": ...}`, field errors (`{"username": ["..."]}`) or a bare list
/// of strings.
pub fn server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    match &value {
        Value::Object(map) => {
            for key in ["detail", "error", "message"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return Some(s.clone());
                }
            }
            map.iter().find_map(|(field, v)| {
                let first = match v {
                    Value::Array(items) => items.first()?.as_str()?,
                    Value::String(s) => s.as_str(),
                    _ => return None,
                };
                Some(format!("{field}: {first}"))
            })
        }
        Value::Array(items) => items.first()?.as_str().map(str::to_string),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

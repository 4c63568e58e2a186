//! In-crate fakes shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use urbanshield_common::FeatureCollection;

use crate::alerts::{NotificationPermission, Notifier};
use crate::auth::{TokenStore, UserIdentity};
use crate::error::GatewayError;
use crate::gateway::{ApiRequest, ApiResponse, Gateway, HttpTransport};
use crate::layers::{AssetError, AssetFetcher};
use crate::storage::MemoryStore;

type Handler = dyn Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, GatewayError> + Send + Sync;
type DelayFn = dyn Fn(&ApiRequest) -> Duration + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl RecordedCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A transport whose replies come from a closure, optionally after a
/// per-request delay (use with paused time).
pub struct ScriptedTransport {
    handler: Box<Handler>,
    delay: Box<DelayFn>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, GatewayError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Box::new(|_| Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: impl Fn(&ApiRequest) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        self.calls.lock().push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            bearer: bearer.map(str::to_string),
        });
        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request, bearer)
    }
}

pub fn json_reply(status: u16, body: Value) -> Result<ApiResponse, GatewayError> {
    Ok(ApiResponse {
        status: StatusCode::from_u16(status).unwrap(),
        body: serde_json::to_vec(&body).unwrap(),
    })
}

pub fn status_reply(status: u16) -> Result<ApiResponse, GatewayError> {
    Ok(ApiResponse {
        status: StatusCode::from_u16(status).unwrap(),
        body: Vec::new(),
    })
}

/// A gateway over `transport` with a logged-in session whose access token
/// is `valid`.
pub async fn gateway_with(transport: Arc<ScriptedTransport>) -> Gateway {
    let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
    tokens
        .establish(
            "valid".into(),
            Some("refresh".into()),
            UserIdentity {
                username: "ravi".into(),
                is_admin: false,
            },
        )
        .await
        .unwrap();
    Gateway::new(transport, tokens)
}

/// Records every notification and permission prompt.
pub struct RecordingNotifier {
    permission: Mutex<NotificationPermission>,
    grant_on_request: NotificationPermission,
    hangs: bool,
    shown: Mutex<Vec<(String, String)>>,
    prompts: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
            grant_on_request: permission,
            hangs: false,
            shown: Mutex::new(Vec::new()),
            prompts: Mutex::new(0),
        }
    }

    /// The answer the user gives when prompted.
    pub fn answering(mut self, answer: NotificationPermission) -> Self {
        self.grant_on_request = answer;
        self
    }

    /// The prompt stays open forever.
    pub fn never_answering(mut self) -> Self {
        self.hangs = true;
        self
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().clone()
    }

    pub fn prompts(&self) -> usize {
        *self.prompts.lock()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> NotificationPermission {
        *self.prompts.lock() += 1;
        if self.hangs {
            std::future::pending::<()>().await;
        }
        *self.permission.lock() = self.grant_on_request;
        self.grant_on_request
    }

    fn show(&self, title: &str, body: &str) {
        self.shown.lock().push((title.to_string(), body.to_string()));
    }
}

/// Facility documents held in memory. Unknown names fail like a missing file.
#[derive(Default)]
pub struct MemoryAssets {
    documents: Mutex<std::collections::HashMap<String, FeatureCollection>>,
}

impl MemoryAssets {
    pub fn with(self, name: &str, points: &[(f64, f64)]) -> Self {
        let features = points
            .iter()
            .map(|(lat, lon)| {
                serde_json::from_value(serde_json::json!({
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [lon, lat] },
                    "properties": { "name": format!("{name} {lat},{lon}") }
                }))
                .unwrap()
            })
            .collect();
        self.documents
            .lock()
            .insert(name.to_string(), FeatureCollection { features });
        self
    }
}

#[async_trait]
impl AssetFetcher for MemoryAssets {
    async fn fetch(&self, name: &str) -> Result<FeatureCollection, AssetError> {
        self.documents.lock().get(name).cloned().ok_or_else(|| {
            AssetError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, name.to_string()))
        })
    }
}

//! Authenticated request gateway.
//!
//! Every outbound API call goes through [`Gateway::send`]. The gateway
//! attaches the current access token, and on a 401 performs one refresh
//! shared by every request that hit the 401 while it was in flight, then
//! replays each of those requests exactly once.

pub mod request;
pub mod transport;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

pub use request::{ApiRequest, ApiResponse};
pub use transport::{HttpTransport, ReqwestTransport};

use crate::auth::TokenStore;
use crate::error::{server_message, GatewayError};

pub const REFRESH_PATH: &str = "token/refresh/";

/// The one refresh currently in progress. Every clone resolves to the same
/// outcome; the future removes itself from the gateway once it settles.
type RefreshFlight = Shared<BoxFuture<'static, Result<String, GatewayError>>>;

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// A request captured for replay after a token refresh.
struct PendingRequest {
    request: ApiRequest,
    retried: bool,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    flight: Mutex<Option<RefreshFlight>>,
    refresh_calls: Arc<AtomicU64>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: TokenStore) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                transport,
                tokens,
                flight: Mutex::new(None),
                refresh_calls: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Number of refresh calls actually sent to the server.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }

    /// Send `request`, refreshing the access token at most once on a 401.
    ///
    /// Anonymous requests never trigger a refresh; their 401 is returned as a
    /// [`GatewayError::Server`].
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        if !request.authenticated {
            let response = self.inner.transport.execute(&request, None).await?;
            return check_status(response);
        }

        let mut pending = PendingRequest {
            request,
            retried: false,
        };
        let mut bearer = self.inner.tokens.access_token();
        loop {
            let response = self
                .inner
                .transport
                .execute(&pending.request, bearer.as_deref())
                .await?;
            if response.status != StatusCode::UNAUTHORIZED || pending.retried {
                return check_status(response);
            }

            tracing::debug!(path = %pending.request.path, "access token rejected");
            pending.retried = true;
            bearer = Some(self.refreshed_token(bearer.as_deref()).await?);
        }
    }

    /// Resolve a usable access token after `stale` was rejected: join the
    /// active refresh, reuse a token installed since `stale` was read, or
    /// start a new refresh.
    async fn refreshed_token(&self, stale: Option<&str>) -> Result<String, GatewayError> {
        let flight = {
            let mut slot = self.inner.flight.lock();
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    if let Some(current) = self.inner.tokens.access_token() {
                        if stale != Some(current.as_str()) {
                            return Ok(current);
                        }
                    }
                    let flight = self.start_flight();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    fn start_flight(&self) -> RefreshFlight {
        let transport = self.inner.transport.clone();
        let tokens = self.inner.tokens.clone();
        let calls = self.inner.refresh_calls.clone();
        let owner: Weak<GatewayInner> = Arc::downgrade(&self.inner);

        async move {
            let outcome = refresh(transport.as_ref(), &tokens, &calls).await;
            if let Some(inner) = owner.upgrade() {
                inner.flight.lock().take();
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn refresh(
    transport: &dyn HttpTransport,
    tokens: &TokenStore,
    calls: &AtomicU64,
) -> Result<String, GatewayError> {
    let Some(refresh_token) = tokens.refresh_token() else {
        tracing::info!("access token rejected and no refresh token is stored");
        tokens.expire().await;
        return Err(GatewayError::AuthExpired);
    };

    calls.fetch_add(1, Ordering::Relaxed);
    let request = ApiRequest::post(REFRESH_PATH, json!({ "refresh": refresh_token })).anonymous();
    let issued = transport
        .execute(&request, None)
        .await
        .and_then(check_status)
        .and_then(|response| response.json::<RefreshResponse>());

    match issued {
        Ok(issued) => {
            if let Err(err) = tokens
                .apply_refresh(issued.access.clone(), issued.refresh)
                .await
            {
                tracing::warn!(?err, "refreshed token could not be persisted");
            }
            tracing::debug!("access token refreshed");
            Ok(issued.access)
        }
        Err(err) => {
            tracing::warn!(%err, "token refresh failed, ending session");
            tokens.expire().await;
            Err(GatewayError::AuthExpired)
        }
    }
}

fn check_status(response: ApiResponse) -> Result<ApiResponse, GatewayError> {
    if response.status.is_success() {
        Ok(response)
    } else {
        Err(GatewayError::Server {
            status: response.status,
            message: server_message(&response.body),
        })
    }
}

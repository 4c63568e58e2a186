//! The wire underneath the gateway.

use std::time::Duration;

use async_trait::async_trait;

use super::request::{ApiRequest, ApiResponse};
use crate::error::GatewayError;

/// Executes a single HTTP exchange. Implementations never interpret status
/// codes; the gateway owns the 401 / refresh policy.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, GatewayError>;
}

/// `reqwest`-backed transport against the UrbanShield API base URL.
#[derive(Clone)]
pub struct ReqwestTransport {
    base_url: String,
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        let url = self.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(?e, %url, "request failed before a response arrived");
            GatewayError::Network(e.to_string())
        })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?
            .to_vec();

        tracing::trace!(%url, %status, bytes = body.len(), "response received");
        Ok(ApiResponse { status, body })
    }
}

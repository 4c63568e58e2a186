pub mod alerts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod layers;
pub mod location;
pub mod search;
pub mod storage;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use alerts::{AlertBroadcast, Notifier, ProximityAlertEngine};
use api::PortalApi;
use auth::{AuthService, TokenStore};
use config::Config;
use error::InitError;
use gateway::{Gateway, HttpTransport, ReqwestTransport};
use layers::{AssetFetcher, DirectoryAssets, LayerOrchestrator};
use location::{GeoPresenceBeacon, LocationSource};
use search::{LiveSearchEngine, SearchCache};
use storage::{FileStore, KeyValueStore};

/// Shared client state. Components built from one context share the session,
/// the gateway (and so its single refresh flight), the alert channel and the
/// search cache.
#[derive(Clone)]
pub struct PortalContext {
    pub config: Arc<Config>,
    pub tokens: TokenStore,
    pub gateway: Gateway,
    pub api: PortalApi,
    pub auth: AuthService,
    pub alerts: AlertBroadcast,
    pub search_cache: SearchCache,
}

impl PortalContext {
    pub fn new(config: Config, kv: Arc<dyn KeyValueStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self::assemble(config, TokenStore::new(kv), transport)
    }

    /// Open the session file, restore any stored session and connect to the
    /// configured API.
    pub async fn from_config(config: Config) -> Result<Self, InitError> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.state_file).await?);
        let tokens = TokenStore::restore(kv).await?;
        let transport = Arc::new(ReqwestTransport::new(&config.api_url, config.http_timeout)?);
        tracing::info!(api = %config.api_url, authenticated = tokens.is_authenticated(), "portal context ready");
        Ok(Self::assemble(config, tokens, transport))
    }

    fn assemble(config: Config, tokens: TokenStore, transport: Arc<dyn HttpTransport>) -> Self {
        let gateway = Gateway::new(transport, tokens.clone());
        Self {
            config: Arc::new(config),
            api: PortalApi::new(gateway.clone()),
            auth: AuthService::new(gateway.clone()),
            tokens,
            gateway,
            alerts: AlertBroadcast::new(),
            search_cache: SearchCache::new(),
        }
    }

    pub fn beacon(&self, source: Arc<dyn LocationSource>) -> GeoPresenceBeacon {
        GeoPresenceBeacon::new(source, self.api.clone())
    }

    pub fn proximity_engine(
        &self,
        source: Arc<dyn LocationSource>,
        notifier: Arc<dyn Notifier>,
    ) -> ProximityAlertEngine {
        ProximityAlertEngine::new(source, self.api.clone(), notifier, self.alerts.clone())
    }

    pub fn search_engine(&self) -> LiveSearchEngine {
        LiveSearchEngine::new(self.api.clone(), self.search_cache.clone())
    }

    pub fn layers(&self, assets: Arc<dyn AssetFetcher>) -> LayerOrchestrator {
        LayerOrchestrator::new(self.api.clone(), assets)
    }

    /// Facility documents from the configured asset directory.
    pub fn facility_assets(&self) -> Arc<dyn AssetFetcher> {
        Arc::new(DirectoryAssets::new(&self.config.asset_dir))
    }

    /// A layer orchestrator over [`Self::facility_assets`].
    pub fn layers_from_config(&self) -> LayerOrchestrator {
        self.layers(self.facility_assets())
    }
}

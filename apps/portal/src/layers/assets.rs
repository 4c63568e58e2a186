//! Static GeoJSON documents for the facility layers.

use std::path::PathBuf;

use async_trait::async_trait;
use urbanshield_common::FeatureCollection;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GeoJSON: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<FeatureCollection, AssetError>;
}

/// Reads documents from a local directory.
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl AssetFetcher for DirectoryAssets {
    async fn fetch(&self, name: &str) -> Result<FeatureCollection, AssetError> {
        let path = self.root.join(name);
        let bytes = tokio::fs::read(&path).await?;
        let collection: FeatureCollection = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %path.display(), features = collection.features.len(), "loaded asset");
        Ok(collection)
    }
}

//! Storage provider contract and the name-keyed registry that builds providers.

pub mod azure;
mod registry;

pub use registry::{ProviderFactory, ProviderRegistry, RegistryError};

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use azure::AzureConfig;

/// A remote object store holding snapshot files.
///
/// Remote names are plain strings; each backend decides how they map onto
/// its own keys.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Upload the local file `source` as `target`.
    async fn backup(&self, cancel: &CancellationToken, source: &Path, target: &str) -> anyhow::Result<()>;

    /// Download `source` into the local path `target`.
    async fn restore(&self, cancel: &CancellationToken, source: &str, target: &Path) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Backend-specific configuration, one variant per built-in provider.
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Azure(AzureConfig),
}

impl ProviderConfig {
    /// Registry name of the backend this configuration is for.
    pub fn provider_name(&self) -> &'static str {
        match self {
            ProviderConfig::Azure(_) => azure::PROVIDER_NAME,
        }
    }
}

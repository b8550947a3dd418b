//! Azure Blob Storage backend.
//!
//! Backup checks container access, hashes the local file, uploads it with a
//! `sha256` metadata field, and validates the stored blob: by HEAD (size and
//! digest) when authorized with a SAS, by listing (size only) otherwise.
//! Files above [`UploadLayout::single_put_limit`] are staged as blocks and
//! committed with one block list.
//! Restore downloads through the part-file sink. Every remote call runs under
//! the retry engine with [`BlobError::is_retryable`].

mod client;
mod credential;
mod error;
mod list;

pub use client::{block_id, BlobClient, BlobProperties, API_VERSION};
pub use credential::{
    Credential, TokenSource, Validation, DEFAULT_AUTHORITY_HOST, DEFAULT_IMDS_ENDPOINT, STORAGE_SCOPE,
};
pub use error::{BlobError, AUTHORIZATION_CODES, CONTAINER_NOT_FOUND, SERVER_BUSY};
pub use list::{parse_list, BlobItem, ListPage};

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{ProviderConfig, StorageProvider};
use crate::checksum::{self, ChecksumRecord};
use crate::retry::{self, RetryPolicy};
use crate::secret::Secret;

pub const PROVIDER_NAME: &str = "azure";

/// `[azure]` section of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub account: String,
    pub container: String,
    /// Container SAS, with or without a leading `?`.
    pub sas_token: Secret,
    pub client_id: String,
    pub client_secret: Secret,
    pub tenant_id: String,
    /// Overrides `https://<account>.blob.core.windows.net/`.
    pub endpoint: Option<String>,
    pub authority_host: Option<String>,
    /// Projected service-account token for workload identity.
    pub federated_token_file: Option<PathBuf>,
    pub imds_endpoint: Option<String>,
}

impl AzureConfig {
    pub fn endpoint(&self) -> String {
        match self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(e) => e.to_string(),
            None => format!("https://{}.blob.core.windows.net/", self.account.trim()),
        }
    }
}

/// How a local file is cut up for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLayout {
    /// Files up to this size go up in one Put Blob.
    pub single_put_limit: u64,
    /// Block size for larger files.
    pub block_size: u64,
}

impl Default for UploadLayout {
    fn default() -> Self {
        Self {
            single_put_limit: 256 * 1024 * 1024,
            block_size: 64 * 1024 * 1024,
        }
    }
}

/// Remote names never start with `/`.
pub fn normalize_key(key: &str) -> &str {
    key.trim().trim_start_matches('/')
}

/// Registry factory for [`PROVIDER_NAME`].
pub fn factory(config: &ProviderConfig, retry: &RetryPolicy) -> anyhow::Result<Box<dyn StorageProvider>> {
    let ProviderConfig::Azure(cfg) = config;
    Ok(Box::new(AzureProvider::new(cfg, *retry)?))
}

pub struct AzureProvider {
    client: BlobClient,
    container: String,
    validation: Validation,
    retry: RetryPolicy,
    layout: UploadLayout,
}

impl AzureProvider {
    pub fn new(cfg: &AzureConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        if cfg.container.trim().is_empty() {
            anyhow::bail!("azure: container is required");
        }
        if cfg.account.trim().is_empty() && cfg.endpoint.is_none() {
            anyhow::bail!("azure: storage account is required");
        }
        let credential = Credential::select(cfg);
        let validation = credential.validation();
        tracing::info!(
            account = %cfg.account,
            container = %cfg.container,
            credential = credential.kind(),
            "azure provider configured"
        );
        let client = BlobClient::new(&cfg.endpoint(), cfg.container.trim(), credential)?;
        Ok(Self {
            client,
            container: cfg.container.trim().to_string(),
            validation,
            retry,
            layout: UploadLayout::default(),
        })
    }

    pub fn with_upload_layout(mut self, layout: UploadLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    /// Run `op` under the retry engine, logging attempts under `action`.
    async fn with_retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        action: &'static str,
        key: &str,
        mut op: F,
    ) -> Result<T, BlobError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BlobError>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        let result = retry::execute(cancel, &self.retry, BlobError::is_retryable, |n| {
            attempts = n;
            tracing::debug!(action, container = %self.container, key, attempt = n, "starting attempt");
            op()
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(action, container = %self.container, key, attempts, elapsed_ms, "ok"),
            Err(e) => tracing::warn!(action, container = %self.container, key, attempts, elapsed_ms, error = %e, "failed"),
        }
        result
    }

    /// Minimal listing; a missing container or missing permission is fatal.
    pub async fn ensure_container(&self, cancel: &CancellationToken) -> Result<(), BlobError> {
        let container = self.container.as_str();
        self.with_retry(cancel, "azure_container_check", "", || async move {
            match self.client.list(cancel, None, 1, None).await {
                Ok(_) => Ok(()),
                Err(e) if e.code() == Some(CONTAINER_NOT_FOUND) => {
                    Err(BlobError::ContainerNotFound(container.to_string()))
                }
                Err(e) if e.code().is_some_and(|c| AUTHORIZATION_CODES.contains(&c)) => {
                    Err(BlobError::NotAuthorized(container.to_string()))
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn upload(
        &self,
        cancel: &CancellationToken,
        source: &Path,
        key: &str,
        local: &ChecksumRecord,
    ) -> Result<(), BlobError> {
        let sha = local.digest_hex.as_str();
        if local.size_bytes <= self.layout.single_put_limit {
            return self
                .with_retry(cancel, "azure_upload", key, || {
                    self.client.put_blob(cancel, key, source, sha)
                })
                .await;
        }

        let block_size = self.layout.block_size.max(1);
        let mut ids: Vec<String> = Vec::new();
        let mut offset = 0u64;
        while offset < local.size_bytes {
            let len = block_size.min(local.size_bytes - offset);
            let id = block_id(ids.len() as u64);
            self.with_retry(cancel, "azure_put_block", key, || {
                self.client.put_block(cancel, key, &id, source, offset, len)
            })
            .await?;
            ids.push(id);
            offset += len;
        }
        tracing::debug!(key, blocks = ids.len(), block_size, "blocks staged");
        self.with_retry(cancel, "azure_put_block_list", key, || {
            self.client.put_block_list(cancel, key, &ids, sha)
        })
        .await
    }

    async fn validate_head(
        &self,
        cancel: &CancellationToken,
        key: &str,
        local: &ChecksumRecord,
    ) -> Result<(), BlobError> {
        self.with_retry(cancel, "azure_head", key, || async move {
            let remote = self.client.head(cancel, key).await?;
            check_properties(local, &remote)
        })
        .await
    }

    async fn validate_list(
        &self,
        cancel: &CancellationToken,
        key: &str,
        local: &ChecksumRecord,
    ) -> Result<(), BlobError> {
        self.with_retry(cancel, "azure_list_validate", key, || async move {
            let size = self.find_size(cancel, key).await?.ok_or_else(|| BlobError::NotFound(key.to_string()))?;
            if size != local.size_bytes {
                return Err(BlobError::SizeMismatch {
                    local: local.size_bytes,
                    remote: size,
                });
            }
            Ok(())
        })
        .await
    }

    /// Size of the blob named exactly `key`, following listing pages.
    async fn find_size(&self, cancel: &CancellationToken, key: &str) -> Result<Option<u64>, BlobError> {
        let mut marker: Option<String> = None;
        loop {
            let page = self.client.list(cancel, Some(key), 1, marker.as_deref()).await?;
            if let Some(item) = page.blobs.iter().find(|b| b.name == key) {
                return Ok(Some(item.content_length.unwrap_or(0)));
            }
            match page.next_marker {
                Some(m) => marker = Some(m),
                None => return Ok(None),
            }
        }
    }
}

/// Compare a HEAD result with the local record: size, then digest.
pub fn check_properties(local: &ChecksumRecord, remote: &BlobProperties) -> Result<(), BlobError> {
    if remote.size != local.size_bytes {
        return Err(BlobError::SizeMismatch {
            local: local.size_bytes,
            remote: remote.size,
        });
    }
    let Some(remote_sha) = remote.sha256.as_deref() else {
        return Err(BlobError::MissingDigest);
    };
    if !remote_sha.eq_ignore_ascii_case(&local.digest_hex) {
        return Err(BlobError::DigestMismatch {
            local: local.digest_hex.clone(),
            remote: remote_sha.to_string(),
        });
    }
    Ok(())
}

fn require_key(raw: &str) -> anyhow::Result<&str> {
    let key = normalize_key(raw);
    if key.is_empty() {
        return Err(BlobError::EmptyKey.into());
    }
    Ok(key)
}

#[async_trait]
impl StorageProvider for AzureProvider {
    async fn backup(&self, cancel: &CancellationToken, source: &Path, target: &str) -> anyhow::Result<()> {
        let key = require_key(target)?;
        self.ensure_container(cancel).await.context("ensure container")?;

        let path = source.to_path_buf();
        let local = tokio::task::spawn_blocking(move || checksum::sha256_file(&path))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r)
            .context("checksum")?;
        tracing::info!(
            key,
            local = %source.display(),
            size = local.size_bytes,
            sha256 = %local.digest_hex,
            "local snapshot hashed"
        );

        self.upload(cancel, source, key, &local).await.context("upload")?;

        match self.validation {
            Validation::Head => self
                .validate_head(cancel, key, &local)
                .await
                .context("validate (head)")?,
            Validation::List => self
                .validate_list(cancel, key, &local)
                .await
                .context("validate (list)")?,
        }
        Ok(())
    }

    async fn restore(&self, cancel: &CancellationToken, source: &str, target: &Path) -> anyhow::Result<()> {
        let key = require_key(source)?;
        let bytes = self
            .with_retry(cancel, "azure_download", key, || {
                self.client.download(cancel, key, target)
            })
            .await
            .context("download")?;
        tracing::info!(key, local = %target.display(), bytes, "download complete");
        Ok(())
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

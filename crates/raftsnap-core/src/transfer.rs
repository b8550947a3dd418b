//! Backup and restore workflows: cluster snapshot ↔ local file ↔ provider.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::AuthProvider;
use crate::config::{DEFAULT_BACKUP_LOCAL, DEFAULT_BACKUP_PREFIX, DEFAULT_RESTORE_LOCAL, DEFAULT_TIMESTAMP_FORMAT};
use crate::provider::StorageProvider;
use crate::raft::{RaftClient, SnapshotRequest};

#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Where the snapshot is written before upload (default `./snapshot.snap`).
    pub local_path: PathBuf,
    /// Remote directory; a timestamped file name is appended.
    pub remote_prefix: String,
    /// strftime layout for the file name.
    pub timestamp_format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Provider key of the snapshot to restore. Required.
    pub remote_key: String,
    /// Download location (default `./restored.snap`); its directory must exist.
    pub local_path: PathBuf,
    /// Use the snapshot-force endpoint.
    pub force: bool,
}

/// `<prefix>/<timestamp>.snap`, prefix trimmed of slashes.
pub fn remote_key(prefix: &str, timestamp_format: &str, ts: DateTime<Utc>) -> Result<String> {
    let prefix = match prefix.trim().trim_matches('/') {
        "" => DEFAULT_BACKUP_PREFIX,
        p => p,
    };
    let layout = match timestamp_format.trim() {
        "" => DEFAULT_TIMESTAMP_FORMAT,
        l => l,
    };
    let mut name = String::new();
    write!(name, "{}", ts.format(layout)).with_context(|| format!("invalid timestamp format {:?}", layout))?;
    Ok(format!("{}/{}.snap", prefix, name))
}

fn or_default(path: &Path, default: &str) -> PathBuf {
    if path.as_os_str().is_empty() {
        PathBuf::from(default)
    } else {
        path.to_path_buf()
    }
}

/// Everything a workflow talks to.
pub struct Transfer<'a> {
    pub cluster_address: &'a str,
    pub auth: &'a dyn AuthProvider,
    pub raft: &'a RaftClient,
    pub provider: &'a dyn StorageProvider,
}

impl Transfer<'_> {
    /// Snapshot the cluster to a local file, then upload it.
    pub async fn backup(&self, cancel: &CancellationToken, opts: &BackupOptions) -> Result<BackupReport> {
        let local = or_default(&opts.local_path, DEFAULT_BACKUP_LOCAL);
        let token = self.auth.acquire(cancel).await.context("vault auth")?;

        let started = Instant::now();
        tracing::info!(action = "vault_snapshot", local = %local.display(), "starting snapshot");
        let req = SnapshotRequest {
            cluster_address: self.cluster_address.to_string(),
            token,
            local_path: local.clone(),
            force: false,
        };
        self.raft.save(cancel, &req).await.context("vault snapshot")?;
        tracing::info!(
            action = "vault_snapshot",
            local = %local.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "snapshot OK"
        );

        let timestamp = Utc::now();
        let key = remote_key(&opts.remote_prefix, &opts.timestamp_format, timestamp)?;
        tracing::debug!(action = "build_key", remote_key = %key, "generated remote key");

        let started = Instant::now();
        self.provider
            .backup(cancel, &local, &key)
            .await
            .context("upload to provider")?;
        tracing::info!(
            action = "upload",
            provider = self.provider.name(),
            remote = %key,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backup OK"
        );
        Ok(BackupReport {
            local_path: local,
            remote_key: key,
            timestamp,
        })
    }

    /// Download a snapshot from the provider, then push it into the cluster.
    pub async fn restore(&self, cancel: &CancellationToken, opts: &RestoreOptions) -> Result<()> {
        let remote = opts.remote_key.trim();
        if remote.is_empty() {
            bail!("restore: remote key is empty (provide RESTORE_SOURCE or CLI arg)");
        }
        let local = or_default(&opts.local_path, DEFAULT_RESTORE_LOCAL);
        if let Some(dir) = local.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.is_dir() {
                bail!("directory {:?} does not exist", dir);
            }
        }

        let started = Instant::now();
        tracing::info!(
            action = "download",
            provider = self.provider.name(),
            remote,
            local = %local.display(),
            "starting download"
        );
        self.provider
            .restore(cancel, remote, &local)
            .await
            .context("download from provider")?;
        tracing::info!(
            action = "download",
            remote,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "download OK"
        );

        let token = self.auth.acquire(cancel).await.context("vault auth")?;
        let started = Instant::now();
        tracing::info!(action = "vault_restore", local = %local.display(), force = opts.force, "starting vault restore");
        let req = SnapshotRequest {
            cluster_address: self.cluster_address.to_string(),
            token,
            local_path: local,
            force: opts.force,
        };
        self.raft.restore(cancel, &req).await.context("vault restore")?;
        tracing::info!(
            action = "vault_restore",
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vault restore OK"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, StaticToken};
    use crate::raft::ClusterSettings;
    use crate::retry::RetryPolicy;
    use crate::secret::Secret;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageProvider for Recorder {
        async fn backup(&self, _: &CancellationToken, source: &Path, target: &str) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("backup {} {}", source.display(), target));
            Ok(())
        }
        async fn restore(&self, _: &CancellationToken, source: &str, target: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("restore {} {}", source, target.display()));
            anyhow::bail!("blob missing")
        }
        fn name(&self) -> &str {
            "recorder"
        }
    }

    struct NoAuth;

    #[async_trait]
    impl AuthProvider for NoAuth {
        async fn acquire(&self, _: &CancellationToken) -> Result<Secret, AuthError> {
            Err(AuthError::NoToken)
        }
    }

    #[test]
    fn key_uses_prefix_and_default_layout() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 8, 15, 42, 1).unwrap();
        assert_eq!(
            remote_key("/backups/vault/", "", ts).unwrap(),
            "backups/vault/2025-09-08T15-42-01Z.snap"
        );
        assert_eq!(remote_key("", "", ts).unwrap(), "vault/snapshots/2025-09-08T15-42-01Z.snap");
        assert_eq!(remote_key("p", "%Y%m%d", ts).unwrap(), "p/20250908.snap");
    }

    #[test]
    fn invalid_layout_is_an_error() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 8, 15, 42, 1).unwrap();
        assert!(remote_key("p", "%Q", ts).is_err());
    }

    #[tokio::test]
    async fn restore_requires_remote_key() {
        let provider = Recorder::default();
        let raft = RaftClient::new(RetryPolicy::default(), ClusterSettings::default());
        let auth = StaticToken::new(Secret::new("t"));
        let t = Transfer {
            cluster_address: "http://127.0.0.1:1",
            auth: &auth,
            raft: &raft,
            provider: &provider,
        };
        let err = t
            .restore(&CancellationToken::new(), &RestoreOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("remote key is empty"), "{}", err);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_requires_existing_local_dir() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Recorder::default();
        let raft = RaftClient::new(RetryPolicy::default(), ClusterSettings::default());
        let t = Transfer {
            cluster_address: "http://127.0.0.1:1",
            auth: &NoAuth,
            raft: &raft,
            provider: &provider,
        };
        let opts = RestoreOptions {
            remote_key: "vault/snapshots/a.snap".into(),
            local_path: dir.path().join("missing/restored.snap"),
            force: false,
        };
        let err = t.restore(&CancellationToken::new(), &opts).await.unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}", err);
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_tagged_and_stops_before_auth() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Recorder::default();
        let raft = RaftClient::new(RetryPolicy::default(), ClusterSettings::default());
        let t = Transfer {
            cluster_address: "http://127.0.0.1:1",
            auth: &NoAuth,
            raft: &raft,
            provider: &provider,
        };
        let opts = RestoreOptions {
            remote_key: "/vault/snapshots/a.snap".into(),
            local_path: dir.path().join("restored.snap"),
            force: true,
        };
        let err = t.restore(&CancellationToken::new(), &opts).await.unwrap_err();
        assert_eq!(format!("{:#}", err), "download from provider: blob missing");
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backup_auth_failure_is_tagged() {
        let provider = Recorder::default();
        let raft = RaftClient::new(RetryPolicy::default(), ClusterSettings::default());
        let t = Transfer {
            cluster_address: "http://127.0.0.1:1",
            auth: &NoAuth,
            raft: &raft,
            provider: &provider,
        };
        let err = t
            .backup(&CancellationToken::new(), &BackupOptions::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<AuthError>().is_some());
        assert!(format!("{:#}", err).starts_with("vault auth: "));
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}

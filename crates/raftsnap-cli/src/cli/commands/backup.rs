//! `raftsnap backup`: snapshot the cluster and upload it.

use anyhow::Result;
use raftsnap_core::config::Config;
use raftsnap_core::transfer::BackupOptions;
use tokio_util::sync::CancellationToken;

use super::Session;

pub async fn run_backup(cfg: &Config, cancel: &CancellationToken) -> Result<()> {
    let session = Session::from_config(cfg)?;
    let opts = BackupOptions {
        local_path: cfg.backup.source.clone(),
        remote_prefix: cfg.backup.target_prefix.clone(),
        timestamp_format: cfg.backup.timestamp_format.clone(),
    };
    let report = session.transfer().backup(cancel, &opts).await?;
    println!(
        "backup complete: {} -> {} ({})",
        report.local_path.display(),
        report.remote_key,
        session.provider.name()
    );
    Ok(())
}

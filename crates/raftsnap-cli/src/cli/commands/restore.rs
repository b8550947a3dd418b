//! `raftsnap restore`: download a snapshot and restore it into the cluster.

use anyhow::Result;
use raftsnap_core::config::Config;
use raftsnap_core::transfer::RestoreOptions;
use tokio_util::sync::CancellationToken;

use super::Session;

pub async fn run_restore(cfg: &Config, cancel: &CancellationToken) -> Result<()> {
    let session = Session::from_config(cfg)?;
    let opts = RestoreOptions {
        remote_key: cfg.restore.source.clone(),
        local_path: cfg.restore.target.clone(),
        force: cfg.restore.force,
    };
    session.transfer().restore(cancel, &opts).await?;
    println!(
        "restore complete: {} -> {}{}",
        opts.remote_key.trim(),
        session.address,
        if opts.force { " (forced)" } else { "" }
    );
    Ok(())
}

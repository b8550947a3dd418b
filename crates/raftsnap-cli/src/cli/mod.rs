//! CLI for the raftsnap snapshot operator.

mod commands;
mod signals;

use anyhow::Result;
use clap::{Parser, Subcommand};
use raftsnap_core::config::{self, Environment};
use std::path::PathBuf;

use commands::{run_backup, run_checksum, run_restore};

/// Top-level CLI for raftsnap.
#[derive(Debug, Parser)]
#[command(name = "raftsnap", version)]
#[command(about = "Back up and restore Vault Raft snapshots to object storage", long_about = None)]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/raftsnap/config.toml, if present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Take a cluster snapshot and upload it to the storage provider.
    Backup {
        /// Local snapshot file (overrides BACKUP_SOURCE).
        source: Option<PathBuf>,
        /// Remote prefix; a timestamped name is appended (overrides BACKUP_TARGET).
        target_prefix: Option<String>,
    },

    /// Download a snapshot from the storage provider and restore it into the cluster.
    Restore {
        /// Remote key of the snapshot (overrides RESTORE_SOURCE).
        remote_key: Option<String>,
        /// Local download path (overrides RESTORE_TARGET).
        local_file: Option<PathBuf>,
        /// Use the snapshot-force endpoint (overrides VAULT_SNAPSHOT_FORCE).
        #[arg(long)]
        force: bool,
    },

    /// Compute SHA-256 and size of a local snapshot file.
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },
}

impl CliCommand {
    pub async fn run_from_args(env: &Environment) -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Checksum { path } => run_checksum(&path).await?,
            CliCommand::Backup { source, target_prefix } => {
                let mut cfg = config::load(cli.config.as_deref(), env)?;
                if let Some(source) = source {
                    cfg.backup.source = source;
                }
                if let Some(prefix) = target_prefix {
                    cfg.backup.target_prefix = prefix;
                }
                let cancel = signals::spawn_shutdown_listener();
                run_backup(&cfg, &cancel).await?;
            }
            CliCommand::Restore {
                remote_key,
                local_file,
                force,
            } => {
                let mut cfg = config::load(cli.config.as_deref(), env)?;
                if let Some(key) = remote_key {
                    cfg.restore.source = key;
                }
                if let Some(local) = local_file {
                    cfg.restore.target = local;
                }
                cfg.restore.force |= force;
                let cancel = signals::spawn_shutdown_listener();
                run_restore(&cfg, &cancel).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

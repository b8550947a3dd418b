//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;
use std::path::PathBuf;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).unwrap()
}

#[test]
fn cli_parse_backup_defaults() {
    let cli = parse(&["raftsnap", "backup"]);
    assert!(cli.config.is_none());
    match cli.command {
        CliCommand::Backup { source, target_prefix } => {
            assert!(source.is_none());
            assert!(target_prefix.is_none());
        }
        _ => panic!("expected Backup"),
    }
}

#[test]
fn cli_parse_backup_positionals() {
    match parse(&["raftsnap", "backup", "/tmp/vault.snap", "prod/vault"]).command {
        CliCommand::Backup { source, target_prefix } => {
            assert_eq!(source, Some(PathBuf::from("/tmp/vault.snap")));
            assert_eq!(target_prefix.as_deref(), Some("prod/vault"));
        }
        _ => panic!("expected Backup"),
    }
}

#[test]
fn cli_parse_restore_force() {
    match parse(&["raftsnap", "restore", "vault/snapshots/a.snap", "--force"]).command {
        CliCommand::Restore {
            remote_key,
            local_file,
            force,
        } => {
            assert_eq!(remote_key.as_deref(), Some("vault/snapshots/a.snap"));
            assert!(local_file.is_none());
            assert!(force);
        }
        _ => panic!("expected Restore"),
    }
}

#[test]
fn cli_parse_restore_without_args() {
    match parse(&["raftsnap", "restore"]).command {
        CliCommand::Restore { remote_key, force, .. } => {
            assert!(remote_key.is_none());
            assert!(!force);
        }
        _ => panic!("expected Restore"),
    }
}

#[test]
fn cli_parse_config_is_global() {
    let cli = parse(&["raftsnap", "restore", "k", "/tmp/r.snap", "--config", "/etc/raftsnap.toml"]);
    assert_eq!(cli.config, Some(PathBuf::from("/etc/raftsnap.toml")));
    let cli = parse(&["raftsnap", "--config", "c.toml", "backup"]);
    assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
}

#[test]
fn cli_parse_checksum() {
    match parse(&["raftsnap", "checksum", "snap.bin"]).command {
        CliCommand::Checksum { path } => assert_eq!(path, PathBuf::from("snap.bin")),
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_usage_errors_exit_2() {
    let err = Cli::try_parse_from(["raftsnap", "upload"]).unwrap_err();
    assert_eq!(err.exit_code(), 2);
    let err = Cli::try_parse_from(["raftsnap", "checksum"]).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn cli_version_flag() {
    let err = Cli::try_parse_from(["raftsnap", "--version"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
}

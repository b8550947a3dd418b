//! Checksum command: SHA-256 and size of a local snapshot.

use anyhow::Result;
use raftsnap_core::checksum;
use std::path::Path;

/// Print `<sha256>  <path>` followed by the size in bytes.
pub async fn run_checksum(path: &Path) -> Result<()> {
    let owned = path.to_path_buf();
    let rec = tokio::task::spawn_blocking(move || checksum::sha256_file(&owned)).await??;
    println!("{}  {}", rec.digest_hex, path.display());
    println!("size: {} bytes", rec.size_bytes);
    Ok(())
}

//! Content digest of a local snapshot file.
//!
//! Computed once before upload and compared against what the object store
//! reports afterwards.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// SHA-256 digest (lowercase hex) and byte length of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub digest_hex: String,
    pub size_bytes: u64,
}

/// Compute SHA-256 and size of a file in one pass.
/// Reads in chunks to keep memory use bounded; snapshots can be large.
pub fn sha256_file(path: &Path) -> Result<ChecksumRecord> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut size_bytes = 0u64;
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size_bytes += n as u64;
    }
    Ok(ChecksumRecord {
        digest_hex: hex::encode(hasher.finalize()),
        size_bytes,
    })
}

//! Sequential writer for a `.part` download file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::temp_path;

/// Temp file being filled by one download attempt.
///
/// Nothing is visible at `final_path` until [`PartFile::finalize`] succeeds.
pub struct PartFile {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl PartFile {
    /// Create (or truncate) `<final_path>.part`. The parent directory must exist.
    pub fn create(final_path: &Path) -> Result<Self> {
        let temp_path = temp_path(final_path);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("failed to create temp file: {}", temp_path.display()))?;
        Ok(PartFile {
            file,
            temp_path,
            final_path: final_path.to_path_buf(),
            written: 0,
        })
    }

    /// Append `data` to the temp file.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .with_context(|| format!("write {}", self.temp_path.display()))?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Path to the current temp file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Fsync, then atomically rename the temp file onto the final path.
    /// Returns the number of bytes in the finished file.
    pub fn finalize(self) -> Result<u64> {
        self.file.sync_all().context("storage sync failed")?;
        let PartFile {
            file,
            temp_path,
            final_path,
            written,
        } = self;
        drop(file);
        std::fs::rename(&temp_path, &final_path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })?;
        Ok(written)
    }

    /// Drop the temp file without touching the final path. Best effort.
    pub fn discard(self) {
        let PartFile { file, temp_path, .. } = self;
        drop(file);
        if let Err(e) = std::fs::remove_file(&temp_path) {
            tracing::warn!(file = %temp_path.display(), error = %e, "could not remove temp file");
        }
    }
}

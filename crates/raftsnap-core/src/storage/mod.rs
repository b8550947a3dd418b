//! Local file lifecycle for downloads.
//!
//! Bytes are streamed into a sibling `<name>.part` file, fsynced, and then
//! atomically renamed onto the final name. A reader of the final path never
//! sees a partial file; an interrupted transfer leaves at most the `.part`.

mod writer;

pub use writer::PartFile;

use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `raft.snap` → `raft.snap.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

/// Create the parent directory of `path` if it is missing.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

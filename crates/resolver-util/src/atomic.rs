//! Atomic write-then-rename for durable store files.
//!
//! `ResolvedPackagesStore::save` and the managed-dependency database both
//! need writes that never leave a half-written file behind if the process
//! is killed mid-write; this is the one place that knowledge lives.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Writes `contents` to `path` by first writing to a temp file in the same
/// directory, then renaming it into place. Rename within a filesystem is
/// atomic, so readers never observe a partial file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "path passed to write_atomic has no parent directory",
        )
    })?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    tracing::trace!(path = %path.display(), bytes = contents.len(), "wrote file atomically");
    Ok(())
}

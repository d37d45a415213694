//! # Scratch Space
//!
//! Request-local staging for uploaded and normalized audio.
//!
//! Filenames are derived from a per-request UUID rather than the
//! client-supplied name, so concurrent uploads can never race on the same
//! path. Each file is held by a guard whose `Drop` removes it, which makes
//! cleanup run on every exit path of a handler, panics included. Deletion is
//! best-effort: a failure to remove a scratch file is logged and swallowed,
//! never surfaced to the client.

use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// A scratch file path owned by a single request.
///
/// The file does not have to exist yet; allocating a guard reserves the name
/// only. Whatever ends up at the path is deleted when the guard drops.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a fresh scratch path under `dir` with the given extension.
    pub fn allocate(dir: &Path, extension: &str) -> Self {
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), extension));
        Self { path }
    }

    /// Reserve a path next to this one: same directory, same stem, different
    /// extension. Used for the normalized WAV derived from an upload.
    pub fn sibling(&self, extension: &str) -> Self {
        Self {
            path: self.path.with_extension(extension),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            // The file may never have been written (early pipeline failure),
            // and deletion errors are deliberately not propagated
            Err(e) => debug!(path = %self.path.display(), error = %e, "Scratch cleanup skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScratchFile::allocate(dir.path(), "wav");
        let b = ScratchFile::allocate(dir.path(), "wav");
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().extension().unwrap(), "wav");
    }

    #[test]
    fn removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::allocate(dir.path(), "mp3");
        std::fs::write(scratch.path(), b"payload").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn drop_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::allocate(dir.path(), "wav");
        // Never written; dropping must not panic
        drop(scratch);
    }

    #[test]
    fn sibling_shares_stem() {
        let dir = tempfile::tempdir().unwrap();
        let raw = ScratchFile::allocate(dir.path(), "mp3");
        let wav = raw.sibling("wav");
        assert_eq!(raw.path().file_stem(), wav.path().file_stem());
        assert_eq!(wav.path().extension().unwrap(), "wav");
    }
}

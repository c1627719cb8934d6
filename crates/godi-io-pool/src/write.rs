//! Write controller: exclusive-create destination writers (§4.2).

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use godi_core::GodiError;

/// A handle that owns one destination file from creation to close.
///
/// Missing parent directories are created on open. On any write error the
/// partially written file is removed before the error is surfaced, and the
/// path is never recorded as closed.
#[derive(Debug)]
pub struct WriteHandle {
    path: PathBuf,
    file: Option<File>,
    closed: Arc<Mutex<Vec<PathBuf>>>,
    failed: bool,
}

impl WriteHandle {
    /// Writes `data` to the destination file.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails; the partial file is
    /// removed as part of [`Self::finish`] in that case.
    pub fn write(&mut self, data: &[u8]) -> Result<(), GodiError> {
        let file = self.file.as_mut().expect("write after finish");
        if let Err(err) = file.write_all(data) {
            self.failed = true;
            return Err(GodiError::io(&self.path, err));
        }
        Ok(())
    }

    /// Closes the handle, recording the path on success, or removing the
    /// partial file on failure.
    ///
    /// Every exit path from the gather stage calls this exactly once, so
    /// the file is always either fully closed-and-recorded or removed.
    pub fn finish(mut self, success: bool) -> Result<(), GodiError> {
        let file = self.file.take().expect("finish called twice");
        let sync_result = if success { file.sync_all() } else { Ok(()) };
        drop(file);

        if success && !self.failed && sync_result.is_ok() {
            self.closed.lock().unwrap().push(self.path.clone());
            Ok(())
        } else {
            let _ = std::fs::remove_file(&self.path);
            match sync_result {
                Err(err) if success => Err(GodiError::io(&self.path, err)),
                _ => Ok(()),
            }
        }
    }

    /// The destination path this handle was opened for.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        // Guarantees close-on-all-exit-paths (§4.2): a handle dropped
        // without an explicit `finish` (e.g. an early return via `?`) still
        // removes its partial file instead of leaking it.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Mirrors [`crate::read::ReadPool`] for destination writes: one pool per
/// physical device, serving exclusive-create opens.
pub struct WritePool {
    closed: Arc<Mutex<Vec<PathBuf>>>,
}

impl WritePool {
    /// Creates a write pool. `streams` is accepted for symmetry with
    /// [`crate::read::ReadPool`]; writes are opened synchronously on the
    /// calling thread since file creation itself is not the bottleneck —
    /// the gather stage's own per-device worker already bounds concurrency.
    #[must_use]
    pub fn new(_streams: usize) -> Self {
        Self {
            closed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates `path` exclusively, failing with [`GodiError::AlreadyExists`]
    /// if it already exists. Missing parent directories are created first.
    ///
    /// # Errors
    ///
    /// Returns an error if parent directories cannot be created or the file
    /// cannot be opened.
    pub fn create_exclusive(&self, path: &Path) -> Result<WriteHandle, GodiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| GodiError::io(parent, err))?;
        }

        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| {
                if err.kind() == io::ErrorKind::AlreadyExists {
                    GodiError::AlreadyExists(path.to_path_buf())
                } else {
                    GodiError::io(path, err)
                }
            })?;

        Ok(WriteHandle {
            path: path.to_path_buf(),
            file: Some(file),
            closed: Arc::clone(&self.closed),
            failed: false,
        })
    }

    /// Every path successfully closed through this pool so far, in close
    /// order.
    #[must_use]
    pub fn closed_paths(&self) -> Vec<PathBuf> {
        self.closed.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_records_closed_path() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(1);
        let path = dir.path().join("out.bin");
        let mut handle = pool.create_exclusive(&path).unwrap();
        handle.write(b"hello").unwrap();
        handle.finish(true).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(pool.closed_paths(), vec![path]);
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(1);
        let path = dir.path().join("nested/deep/out.bin");
        let handle = pool.create_exclusive(&path).unwrap();
        handle.finish(true).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn refuses_to_overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"existing").unwrap();

        let pool = WritePool::new(1);
        let err = pool.create_exclusive(&path).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[test]
    fn failed_finish_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(1);
        let path = dir.path().join("out.bin");
        let mut handle = pool.create_exclusive(&path).unwrap();
        handle.write(b"partial").unwrap();
        handle.finish(false).unwrap();

        assert!(!path.exists());
        assert!(pool.closed_paths().is_empty());
    }

    #[test]
    fn dropping_without_finish_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let pool = WritePool::new(1);
        let path = dir.path().join("out.bin");
        {
            let mut handle = pool.create_exclusive(&path).unwrap();
            handle.write(b"partial").unwrap();
        }
        assert!(!path.exists());
    }
}

#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-gather` is the per-file stage of the sealing pipeline (§4.4): for
//! every source [`FileInfo`] it reads the file once through a [`ReadPool`]
//! handle, fanning each slice to a SHA-1 hasher, an MD5 hasher, and zero or
//! more destination [`WritePool`] writers, and emits one result for the
//! source root plus one result per destination root.
//!
//! # Design
//!
//! The fan-out happens through a single [`std::io::Write`] implementation
//! (an internal tee) so the file is read exactly once regardless of how many
//! destinations it is copied to — sealed-copy never pays for N reads of the
//! same source.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use godi_checksums::{Md5, Sha1, StrongDigest};
use godi_core::{Digests, FileInfo, GodiError, SerializableFileInfo};
use godi_io_pool::{ReadPool, WriteHandle, WritePool};

/// One destination tree a source file is being copied into.
#[derive(Clone)]
pub struct Destination {
    /// Root of the destination tree.
    pub root: PathBuf,
    /// Write pool serving the physical device `root` lives on.
    pub pool: Arc<WritePool>,
}

struct OpenedDestination {
    root: PathBuf,
    handle: WriteHandle,
}

/// Fans written slices to the two strong hashers and any open destination
/// writers, recording the first write failure instead of propagating it
/// through the borrowed hasher state.
struct Tee<'a> {
    sha1: &'a mut Sha1,
    md5: &'a mut Md5,
    writers: Vec<&'a mut WriteHandle>,
    error: Option<GodiError>,
}

impl Write for Tee<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sha1.update(buf);
        self.md5.update(buf);
        for writer in &mut self.writers {
            if let Err(err) = writer.write(buf) {
                self.error = Some(err);
                return Err(io::Error::other("destination write failed"));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reads `source` once, tees it to strong hashers and `destinations`'
/// exclusive-create writers, and returns one [`SerializableFileInfo`] for
/// the source root followed by one per destination root.
///
/// The source result is always emitted, even when `destinations` is empty
/// (pure seal mode) or every destination failed to open — sealed-copy
/// produces seals at both ends (§4.4), so the source's digests are always
/// computed from a single read of the file.
#[must_use]
pub fn gather(read_pool: &ReadPool, source: &FileInfo, destinations: &[Destination]) -> Vec<SerializableFileInfo> {
    let mut sha1 = Sha1::new();
    let mut md5 = Md5::new();

    let mut opened: Vec<OpenedDestination> = Vec::with_capacity(destinations.len());
    let mut open_failures: Vec<(PathBuf, GodiError)> = Vec::new();

    for dest in destinations {
        let dest_path = dest.root.join(&source.rela_path);
        match dest.pool.create_exclusive(&dest_path) {
            Ok(handle) => opened.push(OpenedDestination {
                root: dest.root.clone(),
                handle,
            }),
            Err(err) => {
                tracing::warn!(path = %dest_path.display(), error = %err, "destination open failed");
                open_failures.push((dest.root.clone(), err));
            }
        }
    }

    let (write_error, read_error) = {
        let mut tee = Tee {
            sha1: &mut sha1,
            md5: &mut md5,
            writers: opened.iter_mut().map(|o| &mut o.handle).collect(),
            error: None,
        };
        let handle = read_pool.open(&source.path);
        let (_written, read_error) = handle.copy_to(&mut tee);
        (tee.error, read_error)
    };

    let error = read_error.or(write_error);
    let success = error.is_none();

    let digests: Digests = if success {
        let mut digests = Digests::new();
        digests.insert(Sha1::NAME.to_string(), sha1.finalize().to_vec());
        digests.insert(Md5::NAME.to_string(), md5.finalize().to_vec());
        digests
    } else {
        Digests::new()
    };

    if success {
        tracing::debug!(path = %source.path.display(), "sealed source file");
    } else {
        tracing::warn!(path = %source.path.display(), error = %error.as_ref().unwrap(), "gather failed");
    }

    let mut results = Vec::with_capacity(1 + destinations.len());

    let mut source_result = source.clone();
    source_result.digests = digests.clone();
    results.push(match &error {
        None => SerializableFileInfo::ok(source_result),
        Some(err) => SerializableFileInfo::failed(source_result, clone_error(err)),
    });

    for dest in opened {
        let dest_info = FileInfo {
            path: dest.root.join(&source.rela_path),
            root: dest.root.clone(),
            rela_path: source.rela_path.clone(),
            size: source.size,
            mod_time: source.mod_time,
            digests: digests.clone(),
        };
        match &error {
            None => match dest.handle.finish(true) {
                Ok(()) => results.push(SerializableFileInfo::ok(dest_info)),
                Err(finish_err) => results.push(SerializableFileInfo::failed(dest_info, finish_err)),
            },
            Some(err) => {
                let _ = dest.handle.finish(false);
                results.push(SerializableFileInfo::failed(dest_info, clone_error(err)));
            }
        }
    }

    for (root, open_err) in open_failures {
        let dest_info = FileInfo::new(&root, source.rela_path.clone(), source.size, source.mod_time);
        results.push(SerializableFileInfo::failed(dest_info, open_err));
    }

    results
}

/// [`GodiError`] does not implement `Clone`; the gather stage needs to
/// attach the same failure to the source result and every destination
/// result, so this rebuilds an equivalent error from its display text where
/// the concrete variant doesn't need to survive (everything but `Io`, which
/// round-trips its path with a fresh [`io::Error`] of the same kind).
fn clone_error(err: &GodiError) -> GodiError {
    match err {
        GodiError::Io { path, source } => GodiError::io(path.clone(), io::Error::new(source.kind(), source.to_string())),
        GodiError::Cancelled => GodiError::Cancelled,
        GodiError::DuplicatePath(path) => GodiError::DuplicatePath(path.clone()),
        GodiError::AlreadyExists(path) => GodiError::AlreadyExists(path.clone()),
        GodiError::Decode(msg) => GodiError::Decode(msg.clone()),
        GodiError::SignatureMismatch => GodiError::SignatureMismatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use godi_io_pool::CancelToken;

    fn write_source(dir: &std::path::Path, rela: &str, contents: &[u8]) -> FileInfo {
        let path = dir.join(rela);
        std::fs::write(&path, contents).unwrap();
        FileInfo::new(dir, PathBuf::from(rela), contents.len() as i64, std::time::SystemTime::now())
    }

    #[test]
    fn pure_seal_emits_only_source_result_with_digests() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "a.bin", b"hello");
        let read_pool = ReadPool::new(1, CancelToken::new());

        let results = gather(&read_pool, &source, &[]);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
        assert!(results[0].info.digests.contains_key("sha1"));
        assert!(results[0].info.digests.contains_key("md5"));
    }

    #[test]
    fn sealed_copy_emits_source_and_destination_with_matching_digests() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "a.bin", b"hello world");

        let read_pool = ReadPool::new(1, CancelToken::new());
        let write_pool = Arc::new(WritePool::new(1));
        let destinations = [Destination {
            root: dst_dir.path().to_path_buf(),
            pool: write_pool,
        }];

        let results = gather(&read_pool, &source, &destinations);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert_eq!(results[0].info.digests, results[1].info.digests);
        assert_eq!(
            std::fs::read(dst_dir.path().join("a.bin")).unwrap(),
            b"hello world"
        );
    }

    #[test]
    fn preexisting_destination_fails_but_source_still_seals() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "a.bin", b"hello");
        std::fs::write(dst_dir.path().join("a.bin"), b"existing").unwrap();

        let read_pool = ReadPool::new(1, CancelToken::new());
        let write_pool = Arc::new(WritePool::new(1));
        let destinations = [Destination {
            root: dst_dir.path().to_path_buf(),
            pool: write_pool,
        }];

        let results = gather(&read_pool, &source, &destinations);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(results[1].error.as_ref().unwrap().is_already_exists());
        assert_eq!(std::fs::read(dst_dir.path().join("a.bin")).unwrap(), b"existing");
    }

    #[test]
    fn read_failure_removes_partial_destination_and_fails_all_results() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        // Source record points at a file that does not exist, so the read
        // fails immediately.
        let source = FileInfo::new(src_dir.path(), PathBuf::from("missing.bin"), 5, std::time::SystemTime::now());

        let read_pool = ReadPool::new(1, CancelToken::new());
        let write_pool = Arc::new(WritePool::new(1));
        let destinations = [Destination {
            root: dst_dir.path().to_path_buf(),
            pool: write_pool,
        }];

        let results = gather(&read_pool, &source, &destinations);
        assert_eq!(results.len(), 2);
        assert!(!results[0].is_ok());
        assert!(!results[1].is_ok());
        assert!(!dst_dir.path().join("missing.bin").exists());
    }
}

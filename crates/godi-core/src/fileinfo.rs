//! The per-file record that flows through the sealing pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A digest map, keyed by algorithm name (`"sha1"`, `"md5"`), sorted so the
/// index codec's signature serialization is deterministic.
pub type Digests = BTreeMap<String, Vec<u8>>;

/// Per-file record produced by the walker and completed by the gather stage.
///
/// `path` is always `root.join(rela_path)`; `rela_path` never begins with a
/// path separator. A negative `size` marks a sentinel record (for example
/// the announcement of a written index file) rather than an on-disk file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// The root tree this file belongs to.
    pub root: PathBuf,
    /// Path relative to `root`.
    pub rela_path: PathBuf,
    /// Size in bytes, or a negative sentinel for non-file records.
    pub size: i64,
    /// Last modification time.
    pub mod_time: SystemTime,
    /// Digests keyed by algorithm name, filled in by the gather stage.
    pub digests: Digests,
}

impl FileInfo {
    /// Builds a record for `rela_path` under `root`, without digests.
    #[must_use]
    pub fn new(root: &Path, rela_path: PathBuf, size: i64, mod_time: SystemTime) -> Self {
        Self {
            path: root.join(&rela_path),
            root: root.to_path_buf(),
            rela_path,
            size,
            mod_time,
            digests: Digests::new(),
        }
    }

    /// Builds a sentinel record with no backing file, e.g. to announce a
    /// written index path through the result bus.
    #[must_use]
    pub fn sentinel(path: PathBuf) -> Self {
        Self {
            root: PathBuf::new(),
            rela_path: path.clone(),
            path,
            size: -1,
            mod_time: SystemTime::UNIX_EPOCH,
            digests: Digests::new(),
        }
    }
}

/// A [`FileInfo`] paired with an optional per-file error.
///
/// Only these cross from the gather stage into the aggregator; only
/// error-free ones are ever handed to the index codec.
#[derive(Clone, Debug)]
pub struct SerializableFileInfo {
    /// The file record, always present even when `error` is set so rollback
    /// can still see the `rela_path` it concerns.
    pub info: FileInfo,
    /// The error encountered processing this file, if any.
    pub error: Option<std::sync::Arc<crate::GodiError>>,
}

impl SerializableFileInfo {
    /// Wraps a successfully completed record.
    #[must_use]
    pub const fn ok(info: FileInfo) -> Self {
        Self { info, error: None }
    }

    /// Wraps a record that failed, keeping the partial info for rollback.
    #[must_use]
    pub fn failed(info: FileInfo, error: crate::GodiError) -> Self {
        Self {
            info,
            error: Some(std::sync::Arc::new(error)),
        }
    }

    /// Returns `true` if this record completed without error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

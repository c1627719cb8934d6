//! Error kinds shared by every pipeline stage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every error kind the sealing/verification pipeline can surface.
///
/// Per-file errors (`Io`, `DuplicatePath`, `AlreadyExists`, `Cancelled`) flow
/// through the result bus and are collected by the aggregator, which decides
/// the per-root outcome. `Decode` and `SignatureMismatch` are fatal to the
/// single verify operation that triggered them.
#[derive(Debug, Error)]
pub enum GodiError {
    /// Open, read, write, remove, or stat failure. Poisons the containing root.
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the failing operation concerned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The run was cancelled while this file was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// The same `(root, rela_path)` pair was emitted more than once.
    #[error("path '{0}' was handled multiple times")]
    DuplicatePath(PathBuf),

    /// The destination file already existed before this run started.
    #[error("destination '{0}' already exists")]
    AlreadyExists(PathBuf),

    /// The index file could not be decoded, or carries an unsupported version.
    #[error("failed to decode index: {0}")]
    Decode(String),

    /// The index file's trailing signature did not match its contents.
    #[error("index signature mismatch")]
    SignatureMismatch,
}

impl GodiError {
    /// Wraps a [`std::io::Error`] with the path it concerned.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error means the file predates the current run
    /// and must therefore be excluded from rollback.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns `true` if this is a cancellation, which suppresses index
    /// writing but never triggers rollback or counts as a root failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

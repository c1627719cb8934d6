#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-core` holds the data model and error vocabulary shared by every
//! stage of the sealing pipeline: the walker, the gather stage, the index
//! codec, and the aggregator. Keeping these types in one leaf crate lets the
//! pipeline stages depend on each other only through `godi-core`, never on
//! one another's internals.
//!
//! # Design
//!
//! [`FileInfo`] is the unit of work that flows through the whole pipeline.
//! [`GodiError`] enumerates every error kind the pipeline can surface, and
//! [`ExitCode`] maps a finished run onto a process exit status the way
//! upstream rsync's `errcode.h` maps transfer outcomes.
//!
//! # Errors
//!
//! [`GodiError`] implements [`std::error::Error`] via `thiserror` so it can be
//! threaded through the result bus and ultimately rendered to the user.

mod device;
mod error;
mod exit_code;
mod fileinfo;

pub use device::{device_id, DeviceId};
pub use error::GodiError;
pub use exit_code::ExitCode;
pub use fileinfo::{Digests, FileInfo, SerializableFileInfo};

/// Basename pattern for a prior seal: `godi_YYYY-MM-DD_HHMMSS.gobz`.
pub const INDEX_EXTENSION: &str = "gobz";

/// Returns `true` if `name` looks like an index file this tool would have written.
///
/// Matches `godi_\d{4}-\d{2}-\d{2}_\d{6}\.gobz` without pulling in a regex
/// dependency for a single fixed-shape check.
#[must_use]
pub fn is_index_basename(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("godi_") else {
        return false;
    };
    let Some(rest) = rest.strip_suffix(".gobz") else {
        return false;
    };
    // rest is now "YYYY-MM-DD_HHMMSS" (17 bytes).
    let bytes = rest.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| bytes[r].iter().all(u8::is_ascii_digit);
    digits(0..4) && bytes[4] == b'-' && digits(5..7) && bytes[7] == b'-' && digits(8..10)
        && bytes[10] == b'_'
        && digits(11..17)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_index_basenames() {
        assert!(is_index_basename("godi_2026-07-31_193000.gobz"));
    }

    #[test]
    fn rejects_unrelated_names() {
        assert!(!is_index_basename("a.bin"));
        assert!(!is_index_basename("godi_2026-07-31_193000.txt"));
        assert!(!is_index_basename("godi_2026-07-31_1930.gobz"));
        assert!(!is_index_basename("godi_20AA-07-31_193000.gobz"));
    }
}

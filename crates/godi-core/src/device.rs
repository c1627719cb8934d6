//! Mapping from a root tree to the physical device it lives on.
//!
//! Two roots that resolve to the same [`DeviceId`] share one read pool and
//! one write pool (§5 of the design): this is what keeps spindle-bound
//! devices from being hammered by more than `streams_per_device` concurrent
//! readers while unrelated SSDs or network mounts run independently.

use std::path::Path;

/// Opaque identifier for the physical device backing a root tree.
///
/// On Unix this is the `st_dev` field from `stat(2)`. On platforms without
/// an equivalent primitive every root reports a distinct id, which degrades
/// gracefully to "one pool per root" rather than refusing to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u64);

/// Resolves the device backing `root`.
///
/// # Errors
///
/// Returns an error if `root` cannot be `stat`-ed.
pub fn device_id(root: &Path) -> std::io::Result<DeviceId> {
    imp::device_id(root)
}

#[cfg(unix)]
mod imp {
    use super::DeviceId;
    use std::io;
    use std::os::unix::fs::MetadataExt;
    use std::path::Path;

    pub(super) fn device_id(root: &Path) -> io::Result<DeviceId> {
        let meta = std::fs::metadata(root)?;
        Ok(DeviceId(meta.dev()))
    }
}

#[cfg(not(unix))]
mod imp {
    use super::DeviceId;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT: AtomicU64 = AtomicU64::new(0);

    pub(super) fn device_id(root: &Path) -> io::Result<DeviceId> {
        // No portable device-id primitive: `stat` the path to still surface
        // a missing-root error, but hand out a fresh id per root so callers
        // fall back to one pool per tree instead of refusing to run.
        std::fs::metadata(root)?;
        Ok(DeviceId(NEXT.fetch_add(1, Ordering::Relaxed)))
    }
}

//! Groups root trees by physical device so each device gets exactly one
//! read pool and one write pool (§3 Device map, §5 Scheduling model).

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use godi_core::device_id;

use crate::cancel::CancelToken;
use crate::read::ReadPool;
use crate::write::WritePool;

/// Per-device read pools for a set of roots, keyed by root path.
pub struct ReadPoolMap {
    pools: HashMap<PathBuf, Arc<ReadPool>>,
}

impl ReadPoolMap {
    /// Builds one [`ReadPool`] per physical device backing `roots`, sharing
    /// it across every root that resolves to the same device.
    ///
    /// # Errors
    ///
    /// Returns an error if any root cannot be `stat`-ed.
    #[allow(clippy::needless_pass_by_value)]
    pub fn build(roots: &[PathBuf], streams: usize, cancel: CancelToken) -> io::Result<Self> {
        let mut by_device: HashMap<_, Arc<ReadPool>> = HashMap::new();
        let mut pools = HashMap::with_capacity(roots.len());

        for root in roots {
            let device = device_id(root)?;
            let pool = by_device
                .entry(device)
                .or_insert_with(|| Arc::new(ReadPool::new(streams, cancel.clone())))
                .clone();
            pools.insert(root.clone(), pool);
        }

        Ok(Self { pools })
    }

    /// Returns the pool serving `root`, if `root` is one this map was built
    /// from.
    #[must_use]
    pub fn get(&self, root: &Path) -> Option<&Arc<ReadPool>> {
        self.pools.get(root)
    }
}

/// Per-device write pools for a set of destination roots.
pub struct WritePoolMap {
    pools: HashMap<PathBuf, Arc<WritePool>>,
}

impl WritePoolMap {
    /// Builds one [`WritePool`] per physical device backing `roots`.
    ///
    /// # Errors
    ///
    /// Returns an error if any root cannot be `stat`-ed.
    pub fn build(roots: &[PathBuf], streams: usize) -> io::Result<Self> {
        let mut by_device: HashMap<_, Arc<WritePool>> = HashMap::new();
        let mut pools = HashMap::with_capacity(roots.len());

        for root in roots {
            let device = device_id(root)?;
            let pool = by_device
                .entry(device)
                .or_insert_with(|| Arc::new(WritePool::new(streams)))
                .clone();
            pools.insert(root.clone(), pool);
        }

        Ok(Self { pools })
    }

    /// Returns the pool serving `root`, if `root` is one this map was built
    /// from.
    #[must_use]
    pub fn get(&self, root: &Path) -> Option<&Arc<WritePool>> {
        self.pools.get(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_on_the_same_device_share_a_pool() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();

        let map = ReadPoolMap::build(&[a.clone(), b.clone()], 1, CancelToken::new()).unwrap();
        assert!(Arc::ptr_eq(map.get(&a).unwrap(), map.get(&b).unwrap()));
    }
}

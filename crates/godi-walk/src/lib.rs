#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-walk` produces the lazy sequence of source [`FileInfo`] records that
//! feeds the gather stage (§4.3). It normalizes a set of root trees, drops
//! roots that are a sub-tree of another, and walks each remaining root
//! depth-first, skipping non-regular files and prior seal files.
//!
//! # Design
//!
//! The walker is an [`Iterator`] rather than a channel producer: the gather
//! stage already owns the fan-out into worker threads, so the walker only
//! needs to be a cheap, infallible-to-construct sequence a single thread can
//! drive while dispatching work.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use godi_core::{is_index_basename, FileInfo};

/// Cleans and de-duplicates `roots`: each is canonicalized of trailing
/// separators, and any root that is a prefix of another is dropped so the
/// same file is never walked twice under two roots.
///
/// # Errors
///
/// Returns an error if a root does not exist or is not a directory.
pub fn normalize_roots(roots: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut cleaned = Vec::with_capacity(roots.len());
    for root in roots {
        let meta = fs::metadata(root)?;
        if !meta.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("'{}' is not a directory", root.display()),
            ));
        }
        cleaned.push(clean_path(root));
    }

    cleaned.sort();
    cleaned.dedup();

    let retained: Vec<PathBuf> = cleaned
        .iter()
        .filter(|candidate| {
            !cleaned
                .iter()
                .any(|other| *other != **candidate && candidate.starts_with(other))
        })
        .cloned()
        .collect();

    Ok(retained)
}

fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        out.push(component);
    }
    out
}

/// Walks `root` depth-first, yielding a [`FileInfo`] for every regular file
/// that is not itself a previously written seal.
pub struct Walker {
    root: PathBuf,
    stack: Vec<PathBuf>,
    pending: Vec<FileInfo>,
}

impl Walker {
    /// Starts a walk rooted at `root`. `root` should already be normalized
    /// via [`normalize_roots`].
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        let stack = vec![root.clone()];
        Self {
            root,
            stack,
            pending: Vec::new(),
        }
    }
}

impl Iterator for Walker {
    type Item = std::io::Result<FileInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(info) = self.pending.pop() {
                return Some(Ok(info));
            }

            let dir = self.stack.pop()?;
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) => return Some(Err(err)),
            };

            let mut dir_entries: Vec<_> = match entries.collect::<Result<Vec<_>, _>>() {
                Ok(entries) => entries,
                Err(err) => return Some(Err(err)),
            };
            dir_entries.sort_by_key(std::fs::DirEntry::path);

            let mut found = Vec::new();
            for entry in dir_entries {
                let path = entry.path();
                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(err) => return Some(Err(err)),
                };

                if file_type.is_dir() {
                    self.stack.push(path);
                    continue;
                }

                if !file_type.is_file() {
                    // Symlinks, devices, sockets: skipped per §4.3.
                    continue;
                }

                let basename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or_default();
                if is_index_basename(basename) {
                    continue;
                }

                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(err) => return Some(Err(err)),
                };

                let rela_path = match path.strip_prefix(&self.root) {
                    Ok(rela) => rela.to_path_buf(),
                    Err(_) => continue,
                };

                let mod_time = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                found.push(FileInfo::new(
                    &self.root,
                    rela_path,
                    metadata.len() as i64,
                    mod_time,
                ));
            }

            // Reverse so `pending.pop()` yields files in sorted order.
            found.reverse();
            self.pending = found;
        }
    }
}

/// Walks every root in `roots`, chaining their [`Walker`] iterators.
pub fn walk_all(roots: &[PathBuf]) -> impl Iterator<Item = std::io::Result<FileInfo>> + '_ {
    roots.iter().cloned().flat_map(Walker::new)
}

/// Returns the relative path of every directory under `root`, depth-first,
/// including directories with no files in them.
///
/// Used to mirror a source tree's directory structure (including empty
/// subdirectories, which never produce a [`FileInfo`]) at a sealed-copy
/// destination.
///
/// # Errors
///
/// Returns an error if `root` or any subdirectory cannot be read.
pub fn walk_dirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let path = entry.path();
                if let Ok(rela) = path.strip_prefix(root) {
                    dirs.push(rela.to_path_buf());
                }
                stack.push(path);
            }
        }
    }

    Ok(dirs)
}

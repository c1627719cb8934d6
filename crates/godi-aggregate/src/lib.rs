#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-aggregate` is the single-threaded sink of the sealing pipeline
//! (§4.6, §4.7): it owns per-root result accumulation, decides each root's
//! success/failure outcome, writes the signed index on success or rolls back
//! on failure, and republishes every result onto a typed result bus for a
//! progress consumer.
//!
//! # Design
//!
//! [`Aggregator::run`] receives [`SerializableFileInfo`] results from
//! however many gather workers are in flight over one `mpsc` channel and
//! drains it to completion on a single thread, so the per-root state in
//! [`RootState`] never needs synchronization — concurrency lives entirely
//! upstream, in the gather stage.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use godi_core::{FileInfo, GodiError, SerializableFileInfo};

/// One message on the result bus (§4.7). Fan-in from aggregator decisions,
/// fan-out to a single consumer (the CLI's progress printer, or a test
/// harness).
#[derive(Debug)]
pub enum BusMessage {
    /// A purely informational line, e.g. an index having been written.
    Info(String),
    /// Progress on one file: its record and a human-readable description.
    Progress {
        /// The file the message concerns.
        info: Box<FileInfo>,
        /// Human-readable description, e.g. `"DONE a.bin"` or
        /// `"DONE CP a.bin -> /dst"`.
        text: String,
    },
    /// An error attached to one file (or none, for root-level errors).
    Error {
        /// The file the error concerns, if any.
        info: Option<Box<FileInfo>>,
        /// The error itself.
        error: GodiError,
    },
    /// The final per-run summary, emitted once after finalization.
    Summary(Summary),
}

/// Final outcome of a pipeline run, used by the CLI to choose an exit code.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    /// Number of files successfully sealed or copied.
    pub file_count: u64,
    /// Total bytes processed across all successful files.
    pub total_bytes: u64,
    /// Wall-clock duration of the run.
    pub elapsed: std::time::Duration,
    /// Number of per-file errors recorded (excluding cancellation).
    pub error_count: u64,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl Summary {
    /// Megabytes per second, `0.0` if the run took no measurable time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn megabytes_per_second(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= 0.0 {
            return 0.0;
        }
        (self.total_bytes as f64 / 1_000_000.0) / seconds
    }
}

/// Creates a fresh result bus channel.
#[must_use]
pub fn channel() -> (Sender<BusMessage>, Receiver<BusMessage>) {
    std::sync::mpsc::channel()
}

/// Registration for one root the aggregator tracks.
#[derive(Clone)]
pub struct RootSpec {
    /// The root path, matched against each result's `info.root`.
    pub root: PathBuf,
    /// `true` if this root is a sealed-copy destination (eligible for
    /// rollback on failure); `false` for a pure-seal source root.
    pub is_destination: bool,
}

struct RootState {
    spec: RootSpec,
    entries: Vec<SerializableFileInfo>,
    seen_rela_paths: HashSet<PathBuf>,
    has_error: bool,
    cancelled: bool,
}

impl RootState {
    fn new(spec: RootSpec) -> Self {
        Self {
            spec,
            entries: Vec::new(),
            seen_rela_paths: HashSet::new(),
            has_error: false,
            cancelled: false,
        }
    }
}

/// Owns per-root aggregation state for the lifetime of one pipeline run.
pub struct Aggregator {
    roots: HashMap<PathBuf, RootState>,
    started_at: Instant,
}

impl Aggregator {
    /// Builds an aggregator tracking exactly the roots in `specs`.
    #[must_use]
    pub fn new(specs: Vec<RootSpec>) -> Self {
        let roots = specs
            .into_iter()
            .map(|spec| (spec.root.clone(), RootState::new(spec)))
            .collect();
        Self {
            roots,
            started_at: Instant::now(),
        }
    }

    /// Records one gather result, forwarding a rendered message to `bus`.
    ///
    /// # Panics
    ///
    /// Panics if `result.info.root` is not one of the roots this aggregator
    /// was built with — an internal invariant violation (§4.6, §7).
    pub fn record(&mut self, result: SerializableFileInfo, bus: &Sender<BusMessage>) {
        let root_key = result.info.root.clone();
        let state = self
            .roots
            .get_mut(&root_key)
            .unwrap_or_else(|| panic!("gather result for unregistered root '{}'", root_key.display()));

        if state.has_error {
            state.entries.push(result);
            return;
        }

        let result = if state.seen_rela_paths.contains(&result.info.rela_path) {
            let info = result.info;
            tracing::warn!(path = %info.rela_path.display(), "duplicate path in root");
            let rela_path = info.rela_path.clone();
            SerializableFileInfo::failed(info, GodiError::DuplicatePath(rela_path))
        } else {
            state.seen_rela_paths.insert(result.info.rela_path.clone());
            result
        };

        match &result.error {
            None => {
                let text = render_done(&state.spec, &result.info);
                let _ = bus.send(BusMessage::Progress {
                    info: Box::new(result.info.clone()),
                    text,
                });
            }
            Some(err) if err.is_cancelled() => {
                state.cancelled = true;
                let _ = bus.send(BusMessage::Error {
                    info: Some(Box::new(result.info.clone())),
                    error: GodiError::Cancelled,
                });
            }
            Some(_) => {
                if !matches!(&result.error, Some(err) if matches!(&**err, GodiError::DuplicatePath(_))) {
                    state.has_error = true;
                }
                let err_text = result.error.as_ref().unwrap().to_string();
                tracing::warn!(path = %result.info.rela_path.display(), error = %err_text, "gather error");
                let _ = bus.send(BusMessage::Error {
                    info: Some(Box::new(result.info.clone())),
                    error: clone_error(result.error.as_ref().unwrap()),
                });
            }
        }

        state.entries.push(result);
    }

    /// Finalizes every root: writes an index for each clean, non-cancelled
    /// root, rolls back failed destination roots, and returns the run
    /// summary. Sends every finalization message to `bus` before the
    /// [`BusMessage::Summary`].
    pub fn finalize(mut self, bus: &Sender<BusMessage>) -> Summary {
        let mut summary = Summary {
            elapsed: self.started_at.elapsed(),
            ..Summary::default()
        };

        let mut roots: Vec<_> = self.roots.drain().map(|(_, state)| state).collect();
        roots.sort_by(|a, b| a.spec.root.cmp(&b.spec.root));

        for state in roots {
            if state.entries.is_empty() {
                continue;
            }

            let ok_entries: Vec<&FileInfo> = state
                .entries
                .iter()
                .filter(|e| e.is_ok())
                .map(|e| &e.info)
                .collect();

            summary.file_count += ok_entries.len() as u64;
            summary.total_bytes += ok_entries
                .iter()
                .map(|info| info.size.max(0) as u64)
                .sum::<u64>();
            summary.error_count += state.entries.iter().filter(|e| !e.is_ok()).count() as u64;

            if state.cancelled {
                summary.cancelled = true;
            }

            if state.has_error {
                if state.spec.is_destination {
                    roll_back(&state, bus);
                }
                continue;
            }

            if state.cancelled {
                let _ = bus.send(BusMessage::Info(format!(
                    "run cancelled: no index written for '{}'",
                    state.spec.root.display()
                )));
                continue;
            }

            write_index(&state, bus, &mut summary);
        }

        let _ = bus.send(BusMessage::Summary(summary.clone()));
        summary
    }
}

fn render_done(spec: &RootSpec, info: &FileInfo) -> String {
    if spec.is_destination {
        format!("DONE CP {} -> {}", info.rela_path.display(), spec.root.display())
    } else {
        format!("DONE {}", info.rela_path.display())
    }
}

fn roll_back(state: &RootState, bus: &Sender<BusMessage>) {
    let mut to_remove: Vec<&FileInfo> = state
        .entries
        .iter()
        .filter(|e| !matches!(&e.error, Some(err) if err.is_already_exists()))
        .map(|e| &e.info)
        .collect();
    // Longest paths first so children are removed before their parents are
    // considered for empty-directory cleanup.
    to_remove.sort_by_key(|info| std::cmp::Reverse(info.path.as_os_str().len()));

    for info in to_remove {
        match std::fs::remove_file(&info.path) {
            Ok(()) => {
                tracing::debug!(path = %info.path.display(), "rolled back");
                remove_empty_ancestors(&info.path, &state.spec.root);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %info.path.display(), error = %err, "rollback remove failed");
            }
        }
    }

    let _ = bus.send(BusMessage::Info(format!(
        "rolled back '{}'",
        state.spec.root.display()
    )));
}

fn remove_empty_ancestors(path: &Path, root: &Path) {
    let Some(mut dir) = path.parent() else {
        return;
    };
    while dir != root && dir.starts_with(root) {
        match std::fs::read_dir(dir) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
                if std::fs::remove_dir(dir).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
        dir = match dir.parent() {
            Some(p) => p,
            None => break,
        };
    }
}

fn write_index(state: &RootState, bus: &Sender<BusMessage>, summary: &mut Summary) {
    let records: Vec<FileInfo> = state
        .entries
        .iter()
        .filter(|e| e.is_ok())
        .map(|e| e.info.clone())
        .collect();

    let name = index_basename();
    let path = state.spec.root.join(&name);

    let file = match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(f) => f,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "index create failed");
            summary.error_count += 1;
            let _ = bus.send(BusMessage::Error {
                info: None,
                error: GodiError::io(path, err),
            });
            return;
        }
    };

    let mut writer = std::io::BufWriter::new(file);
    if let Err(err) = godi_index::encode(&records, &mut writer) {
        drop(writer);
        let _ = std::fs::remove_file(&path);
        tracing::warn!(path = %path.display(), error = %err, "index encode failed");
        summary.error_count += 1;
        let _ = bus.send(BusMessage::Error {
            info: None,
            error: GodiError::Decode(err.to_string()),
        });
        return;
    }

    let _ = bus.send(BusMessage::Info(format!("wrote index '{}'", path.display())));
}

fn index_basename() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    let days = secs / 86_400;
    let (y, m, d) = civil_from_days(days as i64);
    let time_of_day = secs % 86_400;
    let (hh, mm, ss) = (time_of_day / 3600, (time_of_day % 3600) / 60, time_of_day % 60);
    format!("godi_{y:04}-{m:02}-{d:02}_{hh:02}{mm:02}{ss:02}.{ext}", ext = godi_core::INDEX_EXTENSION)
}

/// Howard Hinnant's `civil_from_days`: days-since-epoch to a proleptic
/// Gregorian calendar date, avoiding a `chrono`/`time` dependency for a
/// single filename timestamp.
const fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn clone_error(err: &GodiError) -> GodiError {
    match err {
        GodiError::Io { path, source } => {
            GodiError::io(path.clone(), std::io::Error::new(source.kind(), source.to_string()))
        }
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
    use std::time::SystemTime;

    fn drain(rx: &Receiver<BusMessage>) -> Vec<BusMessage> {
        rx.try_iter().collect()
    }

    #[test]
    fn seal_mode_writes_index_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RootSpec {
            root: dir.path().to_path_buf(),
            is_destination: false,
        };
        let mut aggregator = Aggregator::new(vec![spec]);
        let (tx, rx) = channel();

        let mut info = FileInfo::new(dir.path(), PathBuf::from("a.bin"), 5, SystemTime::now());
        info.digests.insert("sha1".to_string(), vec![0u8; 20]);
        aggregator.record(SerializableFileInfo::ok(info), &tx);
        let summary = aggregator.finalize(&tx);

        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.error_count, 0);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        drop(drain(&rx));
    }

    #[test]
    fn failed_destination_root_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.bin");
        std::fs::write(&kept, b"kept").unwrap();
        let written = dir.path().join("written.bin");
        std::fs::write(&written, b"written").unwrap();

        let spec = RootSpec {
            root: dir.path().to_path_buf(),
            is_destination: true,
        };
        let mut aggregator = Aggregator::new(vec![spec]);
        let (tx, rx) = channel();

        let ok_info = FileInfo::new(dir.path(), PathBuf::from("written.bin"), 7, SystemTime::now());
        aggregator.record(SerializableFileInfo::ok(ok_info), &tx);

        let failed_info = FileInfo::new(dir.path(), PathBuf::from("bad.bin"), 0, SystemTime::now());
        aggregator.record(
            SerializableFileInfo::failed(failed_info, GodiError::io(dir.path(), std::io::Error::other("boom"))),
            &tx,
        );

        let summary = aggregator.finalize(&tx);
        assert_eq!(summary.error_count, 1);
        assert!(!written.exists());
        assert!(kept.exists());
        assert!(std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .all(|e| !e.file_name().to_string_lossy().ends_with(".gobz")));
        drop(drain(&rx));
    }

    #[test]
    fn duplicate_path_does_not_poison_root() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RootSpec {
            root: dir.path().to_path_buf(),
            is_destination: false,
        };
        let mut aggregator = Aggregator::new(vec![spec]);
        let (tx, rx) = channel();

        let info = FileInfo::new(dir.path(), PathBuf::from("a.bin"), 5, SystemTime::now());
        aggregator.record(SerializableFileInfo::ok(info.clone()), &tx);
        aggregator.record(SerializableFileInfo::ok(info), &tx);

        let summary = aggregator.finalize(&tx);
        assert_eq!(summary.file_count, 1);
        assert_eq!(summary.error_count, 1);
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".gobz"))
            .collect();
        assert_eq!(entries.len(), 1);
        drop(drain(&rx));
    }

    #[test]
    fn cancellation_suppresses_index_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.bin"), b"kept").unwrap();
        let spec = RootSpec {
            root: dir.path().to_path_buf(),
            is_destination: true,
        };
        let mut aggregator = Aggregator::new(vec![spec]);
        let (tx, rx) = channel();

        let info = FileInfo::new(dir.path(), PathBuf::from("kept.bin"), 4, SystemTime::now());
        aggregator.record(SerializableFileInfo::failed(info, GodiError::Cancelled), &tx);

        let summary = aggregator.finalize(&tx);
        assert!(summary.cancelled);
        assert!(dir.path().join("kept.bin").exists());
        let gobz_count = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".gobz"))
            .count();
        assert_eq!(gobz_count, 0);
        drop(drain(&rx));
    }

    #[test]
    fn error_after_root_failure_is_recorded_but_not_acted_on() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RootSpec {
            root: dir.path().to_path_buf(),
            is_destination: false,
        };
        let mut aggregator = Aggregator::new(vec![spec]);
        let (tx, rx) = channel();

        let first = FileInfo::new(dir.path(), PathBuf::from("a.bin"), 0, SystemTime::now());
        aggregator.record(
            SerializableFileInfo::failed(first, GodiError::io(dir.path(), std::io::Error::other("boom"))),
            &tx,
        );

        // Same path as `first`: would be flagged as a duplicate if the root
        // hadn't already failed, and would send its own bus message.
        let second = FileInfo::new(dir.path(), PathBuf::from("a.bin"), 0, SystemTime::now());
        aggregator.record(SerializableFileInfo::ok(second), &tx);

        let summary = aggregator.finalize(&tx);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.file_count, 1, "the later result is still recorded, just not acted on");

        let messages = drain(&rx);
        let error_count = messages.iter().filter(|m| matches!(m, BusMessage::Error { .. })).count();
        assert_eq!(error_count, 1, "only the first error should reach the bus");
    }

    #[test]
    #[should_panic(expected = "unregistered root")]
    fn unknown_root_panics() {
        let mut aggregator = Aggregator::new(vec![]);
        let (tx, _rx) = channel();
        let info = FileInfo::new(Path::new("/nope"), PathBuf::from("a.bin"), 0, SystemTime::now());
        aggregator.record(SerializableFileInfo::ok(info), &tx);
    }
}

#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-cli` is the command-line front end (§4.10): `seal`, `sealed-copy`,
//! and `verify` subcommands over the pipeline built from every other
//! `godi-*` crate. It owns the only two pieces of ambient policy the rest of
//! the pipeline is deliberately ignorant of — how to render the result bus
//! to a human, and how to turn a finished [`Summary`] into a process exit
//! code.
//!
//! # Design
//!
//! The orchestration in [`run`] wires: walker → N gather worker threads per
//! device (bounded by `--streams-per-device`) → aggregator, draining the
//! result bus on the calling thread into a line-oriented progress printer.
//! [`drive_gather`] spawns `streams` gather workers per distinct device read
//! pool (mirroring [`godi_io_pool::ReadPool`]'s own worker-thread/shared-queue
//! shape one level up) so files on the same device are actually gathered in
//! parallel, not merely queued one at a time on the calling thread. A
//! Ctrl-C handler flips the same [`CancelToken`] every worker already polls,
//! so cancellation needs no separate plumbing at this layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use clap::{Parser, Subcommand};

use godi_aggregate::{Aggregator, BusMessage, RootSpec, Summary};
use godi_core::{ExitCode, FileInfo, SerializableFileInfo};
use godi_gather::Destination;
use godi_io_pool::{CancelToken, ReadPoolMap, WritePoolMap};
use godi_logging::VerbosityConfig;

/// Command-line interface for the `godi` binary.
#[derive(Parser, Debug)]
#[command(name = "godi", version, about = "Seal, copy, and verify file trees by content hash")]
pub struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub command: Command,

    /// Maximum concurrent I/O handles per physical device.
    #[arg(long, default_value_t = 1, global = true)]
    pub streams_per_device: usize,

    /// Read parallelism override (defaults to `--streams-per-device`).
    #[arg(long, global = true)]
    pub num_readers: Option<usize>,

    /// Increase verbosity; may be repeated (`-v`, `-vv`, `-vvv`).
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all but error output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
}

/// The three operations `godi` exposes.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Seal each tree in place, writing an index at its root.
    Seal {
        /// Trees to seal.
        trees: Vec<PathBuf>,
    },
    /// Copy sources into destinations, sealing both ends.
    SealedCopy {
        /// Source trees.
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Destination trees, given after a literal `--`.
        #[arg(required = true, last = true)]
        destinations: Vec<PathBuf>,
    },
    /// Verify each index against its tree.
    Verify {
        /// Index files to verify.
        indexes: Vec<PathBuf>,
    },
}

/// Parses `args`, runs the requested operation, and returns the process exit
/// code (§4.8, §6).
#[must_use]
pub fn run<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::Usage;
        }
    };

    godi_logging::init(VerbosityConfig::new(cli.verbose, cli.quiet));

    let streams = cli.num_readers.unwrap_or(cli.streams_per_device).max(1);

    match cli.command {
        Command::Seal { trees } => run_seal(&trees, streams),
        Command::SealedCopy { sources, destinations } => run_sealed_copy(&sources, &destinations, streams),
        Command::Verify { indexes } => run_verify(&indexes),
    }
}

fn run_seal(trees: &[PathBuf], streams: usize) -> ExitCode {
    let roots = match godi_walk::normalize_roots(trees) {
        Ok(roots) if !roots.is_empty() => roots,
        Ok(_) => {
            eprintln!("no trees given");
            return ExitCode::Usage;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };

    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone());

    let read_pools = match ReadPoolMap::build(&roots, streams, cancel) {
        Ok(pools) => pools,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };

    let specs = roots
        .iter()
        .map(|root| RootSpec {
            root: root.clone(),
            is_destination: false,
        })
        .collect();

    let (result_tx, result_rx) = mpsc::channel();
    drive_gather(
        godi_walk::walk_all(&roots),
        &read_pools,
        &Arc::new(Vec::new()),
        streams,
        &result_tx,
    );
    drop(result_tx);

    run_aggregation(specs, result_rx)
}

fn run_sealed_copy(sources: &[PathBuf], destinations: &[PathBuf], streams: usize) -> ExitCode {
    let sources = match godi_walk::normalize_roots(sources) {
        Ok(roots) if !roots.is_empty() => roots,
        Ok(_) => {
            eprintln!("no source trees given");
            return ExitCode::Usage;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };
    let destinations = match godi_walk::normalize_roots(destinations) {
        Ok(roots) if !roots.is_empty() => roots,
        Ok(_) => {
            eprintln!("no destination trees given");
            return ExitCode::Usage;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };

    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone());

    let read_pools = match ReadPoolMap::build(&sources, streams, cancel) {
        Ok(pools) => pools,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };
    let write_pools = match WritePoolMap::build(&destinations, streams) {
        Ok(pools) => pools,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FileSelect;
        }
    };

    let dest_handles: Vec<Destination> = destinations
        .iter()
        .map(|root| Destination {
            root: root.clone(),
            pool: Arc::clone(write_pools.get(root).expect("root registered with its own write pool")),
        })
        .collect();

    let mut specs: Vec<RootSpec> = sources
        .iter()
        .map(|root| RootSpec {
            root: root.clone(),
            is_destination: false,
        })
        .collect();
    specs.extend(destinations.iter().map(|root| RootSpec {
        root: root.clone(),
        is_destination: true,
    }));

    // Mirror every source subdirectory (including ones with no files) at
    // each destination before gathering: `FileInfo` only ever describes
    // regular files, so an empty directory would otherwise never appear on
    // the copy side.
    for source in &sources {
        let dirs = match godi_walk::walk_dirs(source) {
            Ok(dirs) => dirs,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FileSelect;
            }
        };
        for rela_dir in &dirs {
            for dest_root in &destinations {
                if let Err(err) = std::fs::create_dir_all(dest_root.join(rela_dir)) {
                    eprintln!("{err}");
                    return ExitCode::FileSelect;
                }
            }
        }
    }

    let (result_tx, result_rx) = mpsc::channel();
    drive_gather(
        godi_walk::walk_all(&sources),
        &read_pools,
        &Arc::new(dest_handles),
        streams,
        &result_tx,
    );
    drop(result_tx);

    run_aggregation(specs, result_rx)
}

/// Drains `files` through per-device gather worker pools, `streams` workers
/// per distinct read pool, and forwards every result to `result_tx`.
///
/// Driving `gather` from a single sequential loop would mean at most one
/// file in flight no matter how many streams are configured: a `ReadPool`'s
/// own worker threads only parallelize the raw byte reads of whichever one
/// file `gather` is currently blocked on (`ReadHandle::copy_to` hands
/// control back to the calling thread per chunk). Spawning `streams`
/// gather-driving workers per device — grouped by `Arc` pointer identity, so
/// roots sharing a physical device share one pool of workers — gives "total
/// hash-worker parallelism equals the sum across devices" (§5) its intended
/// meaning.
fn drive_gather(
    files: impl Iterator<Item = std::io::Result<FileInfo>>,
    read_pools: &ReadPoolMap,
    destinations: &Arc<Vec<Destination>>,
    streams: usize,
    result_tx: &mpsc::Sender<SerializableFileInfo>,
) {
    let mut job_txs: HashMap<usize, mpsc::Sender<FileInfo>> = HashMap::new();
    let mut workers: Vec<JoinHandle<()>> = Vec::new();

    for info in files.filter_map(Result::ok) {
        let pool = Arc::clone(read_pools.get(&info.root).expect("root registered with its own read pool"));
        let key = Arc::as_ptr(&pool) as usize;

        let job_tx = job_txs.entry(key).or_insert_with(|| {
            let (job_tx, job_rx) = mpsc::channel::<FileInfo>();
            let job_rx = Arc::new(Mutex::new(job_rx));

            for _ in 0..streams {
                let job_rx = Arc::clone(&job_rx);
                let pool = Arc::clone(&pool);
                let destinations = Arc::clone(destinations);
                let result_tx = result_tx.clone();
                workers.push(thread::spawn(move || loop {
                    let job = job_rx.lock().unwrap().recv();
                    match job {
                        Ok(info) => {
                            for item in godi_gather::gather(&pool, &info, &destinations) {
                                let _ = result_tx.send(item);
                            }
                        }
                        Err(_) => break,
                    }
                }));
            }

            job_tx
        });

        let _ = job_tx.send(info);
    }

    // Dropping every sender closes each job channel, so the workers drain
    // whatever is already queued and then exit on their own.
    drop(job_txs);
    for worker in workers {
        let _ = worker.join();
    }
}

fn run_verify(indexes: &[PathBuf]) -> ExitCode {
    let mut error_count = 0u64;

    for index_path in indexes {
        let root = index_path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let file = match std::fs::File::open(index_path) {
            Ok(file) => file,
            Err(err) => {
                eprintln!("{}: {err}", index_path.display());
                error_count += 1;
                continue;
            }
        };
        let mut reader = std::io::BufReader::new(file);

        let records = match godi_index::decode_filter(&mut reader, |_| true) {
            Ok(records) => records,
            Err(err) => {
                eprintln!("{}: {err}", index_path.display());
                error_count += 1;
                continue;
            }
        };

        for record in records {
            let on_disk_path = root.join(&record.rela_path);
            match verify_one(&on_disk_path, &record) {
                Ok(()) => println!("OK {}", record.rela_path.display()),
                Err(message) => {
                    eprintln!("FAILED {}: {message}", record.rela_path.display());
                    error_count += 1;
                }
            }
        }
    }

    if error_count > 0 {
        ExitCode::PartialError
    } else {
        ExitCode::Ok
    }
}

fn verify_one(path: &std::path::Path, expected: &godi_core::FileInfo) -> Result<(), String> {
    let mut sha1 = godi_checksums_sha1();
    let mut md5 = godi_checksums_md5();

    let mut file = std::fs::File::open(path).map_err(|err| err.to_string())?;
    let mut buf = vec![0u8; 32 * 1024];
    loop {
        let n = std::io::Read::read(&mut file, &mut buf).map_err(|err| err.to_string())?;
        if n == 0 {
            break;
        }
        godi_checksums::StrongDigest::update(&mut sha1, &buf[..n]);
        godi_checksums::StrongDigest::update(&mut md5, &buf[..n]);
    }

    let actual_sha1 = godi_checksums::StrongDigest::finalize(sha1).to_vec();
    let actual_md5 = godi_checksums::StrongDigest::finalize(md5).to_vec();

    if expected.digests.get("sha1") != Some(&actual_sha1) {
        return Err("sha1 mismatch".to_string());
    }
    if expected.digests.get("md5") != Some(&actual_md5) {
        return Err("md5 mismatch".to_string());
    }
    Ok(())
}

fn godi_checksums_sha1() -> godi_checksums::Sha1 {
    godi_checksums::StrongDigest::new()
}

fn godi_checksums_md5() -> godi_checksums::Md5 {
    godi_checksums::StrongDigest::new()
}

fn run_aggregation(specs: Vec<RootSpec>, result_rx: mpsc::Receiver<godi_core::SerializableFileInfo>) -> ExitCode {
    let mut aggregator = Aggregator::new(specs);
    let (bus_tx, bus_rx) = godi_aggregate::channel();

    let printer = std::thread::spawn(move || print_progress(&bus_rx));

    for result in result_rx {
        aggregator.record(result, &bus_tx);
    }
    let summary = aggregator.finalize(&bus_tx);
    drop(bus_tx);
    let _ = printer.join();

    ExitCode::from_outcome(summary.error_count, summary.cancelled)
}

fn print_progress(bus_rx: &mpsc::Receiver<BusMessage>) {
    for message in bus_rx {
        match message {
            BusMessage::Info(text) | BusMessage::Progress { text, .. } => println!("{text}"),
            BusMessage::Error { info, error } => match info {
                Some(info) => eprintln!("ERROR {}: {error}", info.rela_path.display()),
                None => eprintln!("ERROR {error}"),
            },
            BusMessage::Summary(summary) => print_summary(&summary),
        }
    }
}

fn print_summary(summary: &Summary) {
    println!(
        "{} files, {} bytes, {:.2?}, {:.1} MB/s, {} errors{}",
        summary.file_count,
        summary.total_bytes,
        summary.elapsed,
        summary.megabytes_per_second(),
        summary.error_count,
        if summary.cancelled { ", cancelled" } else { "" },
    );
}

fn install_ctrlc_handler(cancel: CancelToken) {
    let _ = ctrlc::set_handler(move || cancel.cancel());
}

//! Channel reader: cancellable, bounded-parallel file reads (§4.1).

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use godi_core::GodiError;

use crate::cancel::CancelToken;

/// Size of the buffer lent back and forth between producer and consumer.
pub const BUFFER_SIZE: usize = 32 * 1024;

enum ReadSource {
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
}

/// One chunk of the producer/consumer handshake (§4.1 protocol steps 1-3).
struct ChunkResult {
    buf: Vec<u8>,
    n: usize,
    /// `None` on a successful fill, `Some` on EOF, I/O error, or cancellation.
    terminal: Option<GodiError>,
}

struct ReadJob {
    source: ReadSource,
    path_for_errors: PathBuf,
    ready_rx: Receiver<Vec<u8>>,
    result_tx: Sender<ChunkResult>,
    cancel: CancelToken,
}

/// Handle returned by [`ReadPool::open`]/[`ReadPool::wrap`].
///
/// Its only operation is to drain into a sink; the handshake with the
/// worker thread is entirely internal.
pub struct ReadHandle {
    path_for_errors: PathBuf,
    ready_tx: Sender<Vec<u8>>,
    result_rx: Receiver<ChunkResult>,
}

impl ReadHandle {
    /// Drains the handle into `sink`, returning the number of bytes written
    /// and the first error encountered, if any.
    ///
    /// A cancellation or I/O error short-circuits the drain; end-of-stream
    /// ends it cleanly. The sink always receives a terminal result so this
    /// never blocks forever, per the C1 invariant that the producer always
    /// emits a terminal result.
    pub fn copy_to(self, sink: &mut dyn Write) -> (u64, Option<GodiError>) {
        let mut written = 0u64;
        // Initial ready signal: hand the first buffer to the producer.
        if self
            .ready_tx
            .send(Vec::with_capacity(BUFFER_SIZE))
            .is_err()
        {
            return (0, Some(GodiError::io(&self.path_for_errors, io::Error::other("reader worker gone"))));
        }

        loop {
            let Ok(chunk) = self.result_rx.recv() else {
                return (
                    written,
                    Some(GodiError::io(
                        &self.path_for_errors,
                        io::Error::other("reader worker disconnected"),
                    )),
                );
            };

            if chunk.n > 0 {
                if let Err(err) = sink.write_all(&chunk.buf[..chunk.n]) {
                    return (written, Some(GodiError::io(&self.path_for_errors, err)));
                }
                written += chunk.n as u64;
            }

            match chunk.terminal {
                None => {
                    // Hand the buffer back for the next fill.
                    if self.ready_tx.send(chunk.buf).is_err() {
                        return (written, None);
                    }
                }
                Some(GodiError::Cancelled) => return (written, Some(GodiError::Cancelled)),
                Some(err) => return (written, Some(err)),
                // EOF is signalled as `terminal: None` with `n == 0`; this
                // arm is unreachable but kept exhaustive for clarity.
            }

            if chunk.n == 0 && chunk.terminal.is_none() {
                // Clean EOF: zero bytes, no error.
                return (written, None);
            }
        }
    }
}

/// A bounded pool of worker threads serving reads for one physical device.
///
/// Never opens more than `streams` files concurrently: callers that call
/// [`Self::open`] more times than there are streams simply queue until a
/// worker frees up.
pub struct ReadPool {
    job_tx: Sender<ReadJob>,
    streams: usize,
    cancel: CancelToken,
    _workers: Vec<JoinHandle<()>>,
}

impl ReadPool {
    /// Spawns `streams` worker threads sharing one job queue.
    ///
    /// # Panics
    ///
    /// Panics if `streams` is zero.
    #[must_use]
    pub fn new(streams: usize, cancel: CancelToken) -> Self {
        assert!(streams >= 1, "streams-per-device must be at least 1");
        let (job_tx, job_rx) = mpsc::channel::<ReadJob>();
        let job_rx = std::sync::Arc::new(std::sync::Mutex::new(job_rx));

        let workers = (0..streams)
            .map(|_| {
                let job_rx = std::sync::Arc::clone(&job_rx);
                thread::spawn(move || loop {
                    let job = job_rx.lock().unwrap().recv();
                    match job {
                        Ok(job) => run_job(job),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            job_tx,
            streams,
            cancel,
            _workers: workers,
        }
    }

    /// Returns the number of streams this pool serves in parallel.
    #[must_use]
    pub const fn streams(&self) -> usize {
        self.streams
    }

    /// Opens `path` for reading on a pool worker.
    #[must_use]
    pub fn open(&self, path: &Path) -> ReadHandle {
        self.submit(ReadSource::Path(path.to_path_buf()), path.to_path_buf())
    }

    /// Wraps an existing reader to stream through the pool's workers.
    #[must_use]
    pub fn wrap(&self, path_for_errors: &Path, reader: Box<dyn Read + Send>) -> ReadHandle {
        self.submit(ReadSource::Reader(reader), path_for_errors.to_path_buf())
    }

    fn submit(&self, source: ReadSource, path_for_errors: PathBuf) -> ReadHandle {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();
        let job = ReadJob {
            source,
            path_for_errors: path_for_errors.clone(),
            ready_rx,
            result_tx,
            cancel: self.cancel.clone(),
        };
        // If every worker has already exited the handle still drains
        // cleanly: the result channel closes immediately and `copy_to`
        // reports a disconnect error rather than hanging.
        let _ = self.job_tx.send(job);
        ReadHandle {
            path_for_errors,
            ready_tx,
            result_rx,
        }
    }
}

fn run_job(job: ReadJob) {
    let ReadJob {
        source,
        path_for_errors,
        ready_rx,
        result_tx,
        cancel,
    } = job;

    let mut reader: Box<dyn Read> = match source {
        ReadSource::Reader(r) => r,
        ReadSource::Path(path) => match std::fs::File::open(&path) {
            Ok(f) => Box::new(f),
            Err(err) => {
                // Open-failure is reported as a terminal result, not as a
                // construction failure (§4.1 Failure).
                let _ = ready_rx.recv();
                let _ = result_tx.send(ChunkResult {
                    buf: Vec::new(),
                    n: 0,
                    terminal: Some(GodiError::io(&path, err)),
                });
                return;
            }
        },
    };

    loop {
        let Ok(mut buf) = ready_rx.recv() else {
            return;
        };

        if cancel.is_cancelled() {
            let _ = result_tx.send(ChunkResult {
                buf: Vec::new(),
                n: 0,
                terminal: Some(GodiError::Cancelled),
            });
            return;
        }

        buf.resize(BUFFER_SIZE, 0);
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = result_tx.send(ChunkResult {
                    buf,
                    n: 0,
                    terminal: None,
                });
                return;
            }
            Ok(n) => {
                if result_tx
                    .send(ChunkResult {
                        buf,
                        n,
                        terminal: None,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Err(err) => {
                let _ = result_tx.send(ChunkResult {
                    buf,
                    n: 0,
                    terminal: Some(GodiError::io(&path_for_errors, err)),
                });
                return;
            }
        }
    }
}

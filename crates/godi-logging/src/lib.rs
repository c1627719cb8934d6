#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `godi-logging` installs the global `tracing` subscriber shared by every
//! `godi` binary and library crate (§4.9). Verbosity is driven by a simple
//! count of `-v` flags plus a `--quiet` switch, mirroring the upstream
//! convention of stacking repeated short flags to raise the log level.
//!
//! # Design
//!
//! `RUST_LOG` always takes precedence when set, so operators can reach for
//! the usual `tracing-subscriber` environment-filter workflow without the
//! CLI's own verbosity flags getting in the way.

use tracing_subscriber::EnvFilter;

/// Verbosity requested via the CLI's `-v`/`-q` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerbosityConfig {
    /// Number of `-v` occurrences (0-3; higher values saturate at 3).
    pub verbose: u8,
    /// Whether `--quiet`/`-q` was given. Takes precedence over `verbose`.
    pub quiet: bool,
}

impl VerbosityConfig {
    /// Builds a config from a raw `-v` count and a `--quiet` flag.
    #[must_use]
    pub fn new(verbose: u8, quiet: bool) -> Self {
        Self {
            verbose: verbose.min(3),
            quiet,
        }
    }

    /// The `tracing` level this configuration maps to.
    #[must_use]
    pub const fn level(&self) -> tracing::Level {
        if self.quiet {
            return tracing::Level::ERROR;
        }
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

impl Default for VerbosityConfig {
    fn default() -> Self {
        Self::new(0, false)
    }
}

/// Installs the global `tracing` subscriber at the level `config` maps to.
///
/// `RUST_LOG`, if set, overrides `config` entirely (ambient, per §6
/// Environment). Safe to call more than once per process; later calls are a
/// no-op, matching `tracing_subscriber::fmt().try_init()`'s own contract.
pub fn init(config: VerbosityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level().to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}

//! A one-shot, monotonic cancel signal shared by every worker in a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Broadcast cancellation flag.
///
/// Workers never subscribe to this; they poll it between buffer fills or
/// files, as cheap as a relaxed atomic load. Flipping it is permanent for
/// the lifetime of one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that has not been cancelled yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the flag. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

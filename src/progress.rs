//! Cooperative cancellation and progress reporting primitives.
//!
//! The scanner, validator, and appliers all run potentially long filesystem
//! passes. Rather than pumping a UI event loop, they accept a [`CancelToken`]
//! that is checked at bounded intervals, and report progress through a plain
//! callback of `(current, total)` where the total may be unknown during the
//! first pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared, cloneable cancellation flag.
///
/// Once cancelled, a token stays cancelled; passes observing it return as
/// soon as practical with the partial results built so far. Cancellation is
/// not an error and never rolls back work already applied.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Progress callback: `(current, total)`. `total` is `None` while unknown
/// (e.g. before the pre-count pass has finished, or when it was skipped).
pub type Progress<'a> = &'a (dyn Fn(u64, Option<u64>) + Sync);

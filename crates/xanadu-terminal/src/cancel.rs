//! Cooperative cancellation flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation request.
///
/// Set from an interrupt handler on another thread, consumed on the main
/// thread at loop-safe points (REPL prompt, agent iteration, tool dispatch).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a request is pending, without clearing it.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Test-and-clear: returns `true` once per request.
    pub fn consume(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

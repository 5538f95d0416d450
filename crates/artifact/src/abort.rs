use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cooperative, sticky cancellation flag shared between threads.
///
/// Clones observe the same flag. Once raised it stays raised.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal for every clone.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the signal has been raised.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

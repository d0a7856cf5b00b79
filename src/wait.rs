use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "paused for user" flag.
///
/// A wait loop arms it on entry and spins until an input source (UI button, host
/// serial command) releases it. Cloned handles share the same flag.
#[derive(Debug, Clone, Default)]
pub struct WaitForUser {
    waiting: Arc<AtomicBool>,
}

impl WaitForUser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new wait. Clears any confirmation left over from an earlier wait.
    pub fn arm(&self) {
        self.waiting.store(true, Ordering::SeqCst);
    }

    /// Confirm continuation. Returns false when nobody was waiting.
    pub fn release(&self) -> bool {
        self.waiting.swap(false, Ordering::SeqCst)
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_only_counts_when_armed() {
        let flag = WaitForUser::new();
        assert!(!flag.release());
        flag.arm();
        let handle = flag.clone();
        assert!(handle.is_waiting());
        assert!(handle.release());
        assert!(!flag.is_waiting());
    }
}

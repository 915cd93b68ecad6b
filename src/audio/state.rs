//! Atomic recording flag.
//!
//! Shared between the control thread (start/stop) and the cpal callback,
//! which reads it on every frame delivery to decide whether the frame is
//! queued. The begin/end transitions make the single-active-session policy
//! an explicit, testable contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Thread-safe recording flag, shareable via `Arc`.
#[derive(Debug, Default)]
pub struct RecordingFlag(AtomicBool);

impl RecordingFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(false)))
    }

    /// True while delivered frames should be queued.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Attempt the idle -> recording transition.
    /// Fails if a recording is already in progress.
    pub fn begin(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Recording -> idle. Idempotent, callable from any thread.
    pub fn end(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_exclusive() {
        let flag = RecordingFlag::new();
        assert!(flag.begin());
        assert!(!flag.begin());
        assert!(flag.is_set());
    }

    #[test]
    fn test_end_allows_new_session() {
        let flag = RecordingFlag::new();
        assert!(flag.begin());
        flag.end();
        assert!(!flag.is_set());
        assert!(flag.begin());
    }

    #[test]
    fn test_end_is_idempotent() {
        let flag = RecordingFlag::new();
        flag.end();
        flag.end();
        assert!(!flag.is_set());
        assert!(flag.begin());
    }
}

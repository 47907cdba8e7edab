use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const NOT_PRESSED: u64 = u64::MAX;

/// Reset handoff between the button reader and the control loop.
///
/// Two word-sized atomics and nothing else. The reader only stores the
/// press timestamp and raises `requested`; the loop is the only party that
/// clears `requested`, through [`ResetSignal::take_request`].
#[derive(Debug)]
pub struct ResetSignal {
    pressed_at_ms: AtomicU64,
    requested: AtomicBool,
}

impl ResetSignal {
    pub fn new() -> Self {
        Self {
            pressed_at_ms: AtomicU64::new(NOT_PRESSED),
            requested: AtomicBool::new(false),
        }
    }

    pub fn mark_pressed(&self, now_ms: u64) {
        // Keep the sentinel reserved even at the end of the clock range
        self.pressed_at_ms
            .store(now_ms.min(NOT_PRESSED - 1), Ordering::Release);
    }

    /// Timestamp of the current press, clearing it
    pub fn take_pressed(&self) -> Option<u64> {
        match self.pressed_at_ms.swap(NOT_PRESSED, Ordering::AcqRel) {
            NOT_PRESSED => None,
            at => Some(at),
        }
    }

    pub fn pressed_at(&self) -> Option<u64> {
        match self.pressed_at_ms.load(Ordering::Acquire) {
            NOT_PRESSED => None,
            at => Some(at),
        }
    }

    /// Raise the reset request; idempotent while a request is pending
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Observe and clear the request in one step
    pub fn take_request(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for ResetSignal {
    fn default() -> Self {
        Self::new()
    }
}

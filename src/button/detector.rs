use super::signal::ResetSignal;
use std::sync::Arc;
use tracing::{debug, info};

/// Logical level of the reset input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLevel {
    Pressed,
    Released,
}

/// Edge-driven long-press detector.
///
/// Runs on the input thread and touches nothing but the [`ResetSignal`].
#[derive(Debug, Clone)]
pub struct LongPressDetector {
    signal: Arc<ResetSignal>,
    hold_ms: u64,
}

impl LongPressDetector {
    pub fn new(signal: Arc<ResetSignal>, hold_ms: u64) -> Self {
        Self { signal, hold_ms }
    }

    pub fn hold_ms(&self) -> u64 {
        self.hold_ms
    }

    pub fn signal(&self) -> &Arc<ResetSignal> {
        &self.signal
    }

    /// Feed one edge. Returns true when this edge raised a reset request.
    pub fn on_edge(&self, level: ButtonLevel, now_ms: u64) -> bool {
        match level {
            ButtonLevel::Pressed => {
                self.signal.mark_pressed(now_ms);
                false
            }
            ButtonLevel::Released => {
                let Some(pressed_at) = self.signal.take_pressed() else {
                    return false;
                };

                let held_ms = now_ms.saturating_sub(pressed_at);
                if held_ms >= self.hold_ms {
                    info!("Reset button held for {} ms, requesting reset", held_ms);
                    self.signal.request();
                    true
                } else {
                    debug!("Reset button released after {} ms", held_ms);
                    false
                }
            }
        }
    }
}

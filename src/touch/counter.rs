use super::sensor::TouchSensor;
use crate::clock::elapsed_at_least;
use crate::events::{EventBus, NodeEvent};
use crate::state::TouchState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Threshold detector with a non-blocking debounce window.
///
/// After a touch is accepted the sensor is not read again until the
/// debounce window has elapsed, so a held finger counts once per window.
pub struct DebouncedTouchCounter<S> {
    sensor: S,
    touch_threshold: u32,
    debounce_ms: u64,
    last_accepted_ms: Option<u64>,
    sensor_faulted: bool,
    event_bus: Option<Arc<EventBus>>,
}

impl<S: TouchSensor> DebouncedTouchCounter<S> {
    pub fn new(sensor: S, touch_threshold: u32, debounce_ms: u64) -> Self {
        Self {
            sensor,
            touch_threshold,
            debounce_ms,
            last_accepted_ms: None,
            sensor_faulted: false,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// Whether the window following the last accepted touch is still open
    pub fn in_debounce(&self, now_ms: u64) -> bool {
        match self.last_accepted_ms {
            Some(last) => !elapsed_at_least(now_ms, last, self.debounce_ms),
            None => false,
        }
    }

    /// Poll the sensor once. Returns the new lifetime count on a touch.
    pub fn sample(&mut self, now_ms: u64, state: &mut TouchState) -> Option<u64> {
        if self.in_debounce(now_ms) {
            return None;
        }

        let value = match self.sensor.read() {
            Ok(value) => {
                if self.sensor_faulted {
                    info!("Touch sensor readings recovered");
                    self.sensor_faulted = false;
                }
                value
            }
            Err(e) => {
                // A dead sensor simply never reports a touch
                if !self.sensor_faulted {
                    warn!("Touch sensor unreadable, treating as untouched: {}", e);
                    self.sensor_faulted = true;
                }
                return None;
            }
        };

        if value < self.touch_threshold {
            Some(self.accept(now_ms, state))
        } else {
            None
        }
    }

    /// Count a touch that did not come from the sensor (debug input).
    /// The debounce window still applies.
    pub fn inject(&mut self, now_ms: u64, state: &mut TouchState) -> Option<u64> {
        if self.in_debounce(now_ms) {
            debug!("Injected touch debounced");
            return None;
        }
        Some(self.accept(now_ms, state))
    }

    /// Forget the debounce window, e.g. after a reset
    pub fn rearm(&mut self) {
        self.last_accepted_ms = None;
    }

    fn accept(&mut self, now_ms: u64, state: &mut TouchState) -> u64 {
        let lifetime_count = state.record_touch();
        self.last_accepted_ms = Some(now_ms);

        debug!("Touch detected! Counter: {}", lifetime_count);
        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus.publish(NodeEvent::TouchDetected {
                lifetime_count,
                at_ms: now_ms,
            });
        }

        lifetime_count
    }
}

use serde::Serialize;

/// Touch counters owned by the control loop.
///
/// Each field has exactly one writer: the touch counter increments both,
/// the aggregation log zeroes the interval count, and the reset controller
/// zeroes everything. `interval_count <= lifetime_count` holds after every
/// mutation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TouchState {
    lifetime_count: u64,
    interval_count: u64,
}

impl TouchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Touches since the last reset
    pub fn lifetime_count(&self) -> u64 {
        self.lifetime_count
    }

    /// Touches since the last aggregation tick
    pub fn interval_count(&self) -> u64 {
        self.interval_count
    }

    pub(crate) fn record_touch(&mut self) -> u64 {
        self.lifetime_count = self.lifetime_count.saturating_add(1);
        self.interval_count = self.interval_count.saturating_add(1);
        self.lifetime_count
    }

    /// Snapshot and zero the interval count
    pub(crate) fn take_interval(&mut self) -> u64 {
        std::mem::take(&mut self.interval_count)
    }

    pub(crate) fn clear(&mut self) {
        self.lifetime_count = 0;
        self.interval_count = 0;
    }
}

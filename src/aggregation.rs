use crate::clock::elapsed_at_least;
use crate::events::{report_storage_degraded, EventBus, NodeEvent};
use crate::state::TouchState;
use crate::storage::{AggregationRecord, BoundedLog};
use std::sync::Arc;
use tracing::debug;

/// Result of one aggregation tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Interval not yet elapsed, nothing changed
    Idle,
    /// Record appended to the log
    Persisted(AggregationRecord),
    /// Storage failed; the interval was still closed and its data is lost
    Dropped(AggregationRecord),
}

impl TickOutcome {
    /// The record that was persisted this tick, if any
    pub fn persisted(&self) -> Option<AggregationRecord> {
        match self {
            TickOutcome::Persisted(record) => Some(*record),
            _ => None,
        }
    }
}

/// Closes an aggregation interval every `interval_ms` into the bounded log
pub struct AggregationLog {
    log: BoundedLog,
    interval_ms: u64,
    last_analysis_ms: u64,
    event_bus: Option<Arc<EventBus>>,
}

impl AggregationLog {
    pub fn new(log: BoundedLog, interval_ms: u64) -> Self {
        Self {
            log,
            interval_ms,
            last_analysis_ms: 0,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn log(&self) -> &BoundedLog {
        &self.log
    }

    pub fn last_analysis_ms(&self) -> u64 {
        self.last_analysis_ms
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        elapsed_at_least(now_ms, self.last_analysis_ms, self.interval_ms)
    }

    /// Snapshot the interval into a record when due.
    ///
    /// The interval count is zeroed and the timer advanced whether or not
    /// the store accepted the record. Failed writes are never retried. A
    /// failed trim leaves the record persisted and is reported as degraded
    /// storage.
    pub async fn tick(&mut self, now_ms: u64, state: &mut TouchState) -> TickOutcome {
        if !self.is_due(now_ms) {
            return TickOutcome::Idle;
        }

        let interval_events = state.take_interval();
        let record = AggregationRecord::new(now_ms, state.lifetime_count(), interval_events);
        self.last_analysis_ms = now_ms;

        if let Err(e) = self.log.push(&record).await {
            report_storage_degraded(self.event_bus.as_deref(), "aggregation append", &e);
            return TickOutcome::Dropped(record);
        }

        // The record is stored; an over-capacity log is trimmed again next tick
        match self.log.trim().await {
            Ok(retained) => debug!(
                "Aggregated {} touches (lifetime {}), log holds {} records",
                interval_events, record.lifetime_count, retained
            ),
            Err(e) => report_storage_degraded(self.event_bus.as_deref(), "aggregation trim", &e),
        }

        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus.publish(NodeEvent::RecordAppended { record });
        }
        TickOutcome::Persisted(record)
    }
}

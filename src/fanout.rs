use crate::clock::elapsed_at_least;
use crate::config::PushFormat;
use crate::state::TouchState;
use crate::storage::{AggregationRecord, DataPoint};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const RECORD_PREFIX: &str = "New_Data:";
const RESET_FRAME: &str = "reset";

/// Fire-and-forget delivery of text frames to live subscribers
pub trait Broadcaster: Send + Sync {
    fn subscriber_count(&self) -> usize;

    /// Send a frame to everyone connected. Returns how many were reached.
    fn broadcast(&self, frame: String) -> usize;
}

/// Live subscriber registry backed by a broadcast channel.
///
/// Slow subscribers lag and skip frames instead of applying backpressure.
#[derive(Debug, Clone)]
pub struct SubscriberHub {
    sender: broadcast::Sender<String>,
}

impl SubscriberHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Broadcaster for SubscriberHub {
    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn broadcast(&self, frame: String) -> usize {
        self.sender.send(frame).unwrap_or(0)
    }
}

/// Frames understood by live clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMessage {
    /// Bare lifetime count
    Count(u64),
    /// A newly persisted record, `New_Data:{json}`
    Record(AggregationRecord),
    /// Counters and history were wiped; clients drop their local series
    Reset,
}

impl LiveMessage {
    pub fn to_frame(&self) -> String {
        match self {
            LiveMessage::Count(count) => count.to_string(),
            LiveMessage::Record(record) => {
                let payload = serde_json::to_string(&record.to_data_point())
                    .unwrap_or_else(|_| "{}".to_string());
                format!("{}{}", RECORD_PREFIX, payload)
            }
            LiveMessage::Reset => RESET_FRAME.to_string(),
        }
    }

    /// Decode a frame the way a client distinguishes them: fixed prefix
    /// first, then a bare integer
    pub fn from_frame(frame: &str) -> Option<Self> {
        if frame == RESET_FRAME {
            return Some(LiveMessage::Reset);
        }
        if let Some(payload) = frame.strip_prefix(RECORD_PREFIX) {
            let point: DataPoint = serde_json::from_str(payload).ok()?;
            return Some(LiveMessage::Record(point.into()));
        }
        frame.parse().ok().map(LiveMessage::Count)
    }
}

/// Rate-limited push of the newest data to live subscribers
pub struct FanOut {
    broadcaster: Arc<dyn Broadcaster>,
    push_interval_ms: u64,
    last_push_ms: Option<u64>,
    format: PushFormat,
    pending_record: Option<AggregationRecord>,
}

impl FanOut {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, push_interval_ms: u64, format: PushFormat) -> Self {
        Self {
            broadcaster,
            push_interval_ms,
            last_push_ms: None,
            format,
            pending_record: None,
        }
    }

    pub fn format(&self) -> PushFormat {
        self.format
    }

    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }

    pub fn pending_record(&self) -> Option<AggregationRecord> {
        self.pending_record
    }

    /// Queue a freshly persisted record for the next push.
    /// Only the newest record is kept.
    pub fn stage_record(&mut self, record: AggregationRecord) {
        if self.format == PushFormat::Record {
            self.pending_record = Some(record);
        }
    }

    pub fn discard_pending(&mut self) {
        self.pending_record = None;
    }

    /// Push when the interval has elapsed and someone is listening.
    /// Returns true if a frame was broadcast.
    pub fn maybe_push(&mut self, now_ms: u64, state: &TouchState) -> bool {
        if let Some(last) = self.last_push_ms {
            if !elapsed_at_least(now_ms, last, self.push_interval_ms) {
                return false;
            }
        }

        if self.broadcaster.subscriber_count() == 0 {
            // Nobody to tell; a later subscriber gets fresh data, not this
            self.pending_record = None;
            return false;
        }

        let message = match self.format {
            PushFormat::Count => LiveMessage::Count(state.lifetime_count()),
            PushFormat::Record => match self.pending_record.take() {
                Some(record) => LiveMessage::Record(record),
                None => return false,
            },
        };

        let delivered = self.broadcaster.broadcast(message.to_frame());
        self.last_push_ms = Some(now_ms);
        trace!("Pushed {:?} to {} subscribers", message, delivered);
        true
    }

    /// Tell subscribers the history is gone. Not rate limited.
    pub fn notify_reset(&mut self) -> bool {
        self.pending_record = None;
        if self.broadcaster.subscriber_count() == 0 {
            return false;
        }

        let delivered = self.broadcaster.broadcast(LiveMessage::Reset.to_frame());
        debug!("Reset notification sent to {} subscribers", delivered);
        true
    }
}

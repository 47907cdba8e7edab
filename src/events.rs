use crate::error::EventBusError;
use crate::storage::AggregationRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Diagnostic events emitted by the node components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeEvent {
    /// The touch counter accepted a touch
    TouchDetected { lifetime_count: u64, at_ms: u64 },
    /// An aggregation record was persisted
    RecordAppended { record: AggregationRecord },
    /// A storage operation was skipped because the store failed
    StorageDegraded { operation: String, error: String },
    /// Counters and log were wiped
    DataReset {
        at_ms: u64,
        log_cleared: bool,
        credentials_cleared: bool,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// Process shutdown requested, optionally to be restarted by the supervisor
    ShutdownRequested { reason: String, restart: bool },
}

impl NodeEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            NodeEvent::TouchDetected { lifetime_count, .. } => {
                format!("Touch detected, counter: {}", lifetime_count)
            }
            NodeEvent::RecordAppended { record } => {
                format!("Record appended: {}", record.to_line())
            }
            NodeEvent::StorageDegraded { operation, error } => {
                format!("Storage degraded during {}: {}", operation, error)
            }
            NodeEvent::DataReset {
                log_cleared,
                credentials_cleared,
                ..
            } => format!(
                "Data reset (log cleared: {}, credentials cleared: {})",
                log_cleared, credentials_cleared
            ),
            NodeEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            NodeEvent::ShutdownRequested { reason, restart } => {
                if *restart {
                    format!("Restart requested: {}", reason)
                } else {
                    format!("Shutdown requested: {}", reason)
                }
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            NodeEvent::TouchDetected { .. } => "touch_detected",
            NodeEvent::RecordAppended { .. } => "record_appended",
            NodeEvent::StorageDegraded { .. } => "storage_degraded",
            NodeEvent::DataReset { .. } => "data_reset",
            NodeEvent::SystemError { .. } => "system_error",
            NodeEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Event bus for component coordination using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<NodeEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Never blocks, so it is safe to call from the control loop. Returns the
    /// number of receivers reached; having none is reported as an error that
    /// callers are free to ignore.
    pub fn publish(&self, event: NodeEvent) -> Result<usize, EventBusError> {
        match &event {
            NodeEvent::DataReset { .. } => info!("{}", event.description()),
            NodeEvent::StorageDegraded { operation, error } => {
                warn!("Storage degraded during {}: {}", operation, error);
            }
            NodeEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            NodeEvent::ShutdownRequested { .. } => info!("{}", event.description()),
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Report a skipped storage operation on the bus, or to the log when the
/// component runs without one
pub fn report_storage_degraded(
    event_bus: Option<&EventBus>,
    operation: &str,
    error: &dyn std::fmt::Display,
) {
    match event_bus {
        Some(event_bus) => {
            let _ = event_bus.publish(NodeEvent::StorageDegraded {
                operation: operation.to_string(),
                error: error.to_string(),
            });
        }
        None => warn!("Storage degraded during {}: {}", operation, error),
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&NodeEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &NodeEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<NodeEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<NodeEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<NodeEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<NodeEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(NodeEvent::TouchDetected {
                lifetime_count: 3,
                at_ms: 1500,
            })
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            NodeEvent::TouchDetected { lifetime_count, at_ms } => {
                assert_eq!(lifetime_count, 3);
                assert_eq!(at_ms, 1500);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_reported() {
        let event_bus = EventBus::new(10);
        assert_eq!(event_bus.subscriber_count(), 0);

        let result = event_bus.publish(NodeEvent::SystemError {
            component: "test".to_string(),
            error: "nobody listening".to_string(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let filter = EventFilter::EventTypes(vec!["shutdown_requested"]);
        let mut filtered = EventReceiver::new(event_bus.subscribe(), filter, "test".to_string());

        event_bus
            .publish(NodeEvent::TouchDetected {
                lifetime_count: 1,
                at_ms: 10,
            })
            .unwrap();
        event_bus
            .publish(NodeEvent::ShutdownRequested {
                reason: "test".to_string(),
                restart: true,
            })
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            received,
            NodeEvent::ShutdownRequested {
                reason: "test".to_string(),
                restart: true,
            }
        );
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = NodeEvent::DataReset {
            at_ms: 0,
            log_cleared: true,
            credentials_cleared: false,
        };

        assert_eq!(event.event_type(), "data_reset");
        assert!(event.description().contains("log cleared: true"));
    }
}

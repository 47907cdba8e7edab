use crate::button::ResetSignal;
use crate::events::{report_storage_degraded, EventBus, NodeEvent};
use crate::fanout::FanOut;
use crate::state::TouchState;
use crate::storage::{BoundedLog, CredentialStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Device-level actions a factory reset may trigger
pub trait SystemControl: Send + Sync {
    fn restart(&self, reason: &str);
}

/// Restarts by asking the orchestrator to exit with the restart code,
/// leaving the actual relaunch to the service manager
pub struct ProcessRestart {
    event_bus: Arc<EventBus>,
}

impl ProcessRestart {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self { event_bus }
    }
}

impl SystemControl for ProcessRestart {
    fn restart(&self, reason: &str) {
        let _ = self.event_bus.publish(NodeEvent::ShutdownRequested {
            reason: reason.to_string(),
            restart: true,
        });
    }
}

/// What a serviced reset actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetReport {
    pub at_ms: u64,
    pub log_cleared: bool,
    pub subscribers_notified: bool,
    pub credentials_cleared: bool,
    pub restart_requested: bool,
}

/// Services pending reset requests from the control loop
pub struct ResetController {
    signal: Arc<ResetSignal>,
    log: BoundedLog,
    credentials: Option<CredentialStore>,
    system: Option<Arc<dyn SystemControl>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ResetController {
    pub fn new(signal: Arc<ResetSignal>, log: BoundedLog) -> Self {
        Self {
            signal,
            log,
            credentials: None,
            system: None,
            event_bus: None,
        }
    }

    /// Also erase network credentials and restart on every reset
    pub fn with_factory_reset(
        mut self,
        credentials: CredentialStore,
        system: Arc<dyn SystemControl>,
    ) -> Self {
        self.credentials = Some(credentials);
        self.system = Some(system);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn signal(&self) -> &Arc<ResetSignal> {
        &self.signal
    }

    pub fn is_factory_reset(&self) -> bool {
        self.credentials.is_some()
    }

    /// Perform a pending reset, if any.
    ///
    /// The request is consumed before anything is mutated, so a request
    /// raised while this runs is serviced on the next call.
    pub async fn service_reset(
        &self,
        now_ms: u64,
        state: &mut TouchState,
        fanout: &mut FanOut,
    ) -> Option<ResetReport> {
        if !self.signal.take_request() {
            return None;
        }

        info!(
            "Servicing reset (lifetime count was {})",
            state.lifetime_count()
        );
        state.clear();

        let log_cleared = match self.log.clear().await {
            Ok(()) => true,
            Err(e) => {
                report_storage_degraded(self.event_bus.as_deref(), "reset log removal", &e);
                false
            }
        };

        let subscribers_notified = fanout.notify_reset();

        let mut credentials_cleared = false;
        if let Some(credentials) = &self.credentials {
            match credentials.clear().await {
                Ok(()) => credentials_cleared = true,
                Err(e) => report_storage_degraded(
                    self.event_bus.as_deref(),
                    "reset credential removal",
                    &e,
                ),
            }
        }

        if let Some(event_bus) = &self.event_bus {
            let _ = event_bus.publish(NodeEvent::DataReset {
                at_ms: now_ms,
                log_cleared,
                credentials_cleared,
            });
        }

        let restart_requested = match &self.system {
            Some(system) => {
                info!("Factory reset complete, restarting into provisioning");
                system.restart("factory reset");
                true
            }
            None => false,
        };

        Some(ResetReport {
            at_ms: now_ms,
            log_cleared,
            subscribers_notified,
            credentials_cleared,
            restart_requested,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PushFormat;
    use crate::fanout::SubscriberHub;
    use crate::storage::{AggregationRecord, Credentials, LineStore, MemoryLineStore};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSystem {
        restarts: Mutex<Vec<String>>,
    }

    impl SystemControl for RecordingSystem {
        fn restart(&self, reason: &str) {
            self.restarts.lock().push(reason.to_string());
        }
    }

    struct Fixture {
        store: Arc<MemoryLineStore>,
        signal: Arc<ResetSignal>,
        log: BoundedLog,
        hub: SubscriberHub,
        fanout: FanOut,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryLineStore::new());
        let log = BoundedLog::new(store.clone(), "data.csv", 100);
        let hub = SubscriberHub::new(8);
        let fanout = FanOut::new(Arc::new(hub.clone()), 1000, PushFormat::Count);
        Fixture {
            store,
            signal: Arc::new(ResetSignal::new()),
            log,
            hub,
            fanout,
        }
    }

    fn touched_state(touches: u64) -> TouchState {
        let mut state = TouchState::new();
        for _ in 0..touches {
            state.record_touch();
        }
        state
    }

    #[tokio::test]
    async fn test_no_request_is_a_no_op() {
        let mut f = fixture();
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone());
        let mut state = touched_state(3);

        assert!(controller
            .service_reset(0, &mut state, &mut f.fanout)
            .await
            .is_none());
        assert_eq!(state.lifetime_count(), 3);
    }

    #[tokio::test]
    async fn test_reset_zeroes_state_and_removes_log() {
        let mut f = fixture();
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone());
        let mut state = touched_state(5);
        f.log
            .append(&AggregationRecord::new(60_000, 5, 5))
            .await
            .unwrap();

        let mut subscriber = f.hub.subscribe();
        f.signal.request();

        let report = controller
            .service_reset(70_000, &mut state, &mut f.fanout)
            .await
            .unwrap();

        assert_eq!(state, TouchState::default());
        assert!(report.log_cleared);
        assert!(report.subscribers_notified);
        assert!(!report.credentials_cleared);
        assert!(!report.restart_requested);
        assert!(!f.store.contains("data.csv"));
        assert!(!f.signal.is_requested());
        assert_eq!(subscriber.recv().await.unwrap(), "reset");
    }

    #[tokio::test]
    async fn test_reset_twice_is_idempotent() {
        let mut f = fixture();
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone());
        let mut state = touched_state(2);

        for _ in 0..2 {
            f.signal.request();
            let report = controller
                .service_reset(1000, &mut state, &mut f.fanout)
                .await
                .unwrap();

            assert!(report.log_cleared);
            assert_eq!(state, TouchState::default());
            assert!(f.log.records().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_touch_counted_before_service_does_not_survive() {
        let mut f = fixture();
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone());
        let mut state = TouchState::new();

        f.signal.request();
        state.record_touch();

        controller
            .service_reset(1000, &mut state, &mut f.fanout)
            .await
            .unwrap();

        assert_eq!(state.lifetime_count(), 0);
        assert_eq!(state.interval_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_still_zeroes_state() {
        let mut f = fixture();
        let event_bus = Arc::new(EventBus::new(10));
        let mut events = event_bus.subscribe();
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone())
            .with_event_bus(event_bus);
        let mut state = touched_state(4);

        f.store.set_available(false);
        f.signal.request();

        let report = controller
            .service_reset(1000, &mut state, &mut f.fanout)
            .await
            .unwrap();

        assert!(!report.log_cleared);
        assert_eq!(state, TouchState::default());
        assert!(matches!(
            events.recv().await.unwrap(),
            NodeEvent::StorageDegraded { .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            NodeEvent::DataReset {
                at_ms: 1000,
                log_cleared: false,
                credentials_cleared: false,
            }
        );
    }

    #[tokio::test]
    async fn test_factory_reset_clears_credentials_and_restarts() {
        let mut f = fixture();
        let credentials = CredentialStore::new(f.store.clone(), "ssid.txt", "pass.txt");
        credentials
            .save(&Credentials::new("workshop", "hunter22"))
            .await
            .unwrap();

        let system = Arc::new(RecordingSystem::default());
        let controller = ResetController::new(Arc::clone(&f.signal), f.log.clone())
            .with_factory_reset(credentials.clone(), system.clone());
        let mut state = touched_state(1);

        f.signal.request();
        let report = controller
            .service_reset(1000, &mut state, &mut f.fanout)
            .await
            .unwrap();

        assert!(report.credentials_cleared);
        assert!(report.restart_requested);
        assert!(credentials.load().await.unwrap().is_none());
        assert!(f.store.read_first_line("ssid.txt").await.unwrap().is_none());
        assert_eq!(*system.restarts.lock(), vec!["factory reset".to_string()]);
    }

    #[tokio::test]
    async fn test_process_restart_requests_shutdown() {
        let event_bus = Arc::new(EventBus::new(10));
        let mut events = event_bus.subscribe();

        ProcessRestart::new(Arc::clone(&event_bus)).restart("factory reset");

        assert_eq!(
            events.recv().await.unwrap(),
            NodeEvent::ShutdownRequested {
                reason: "factory reset".to_string(),
                restart: true,
            }
        );
    }
}

use crate::aggregation::{AggregationLog, TickOutcome};
use crate::button::ResetSignal;
use crate::clock::Clock;
use crate::config::TouchnodeConfig;
use crate::error::{Result, StorageError, TouchnodeError};
use crate::events::EventBus;
use crate::fanout::{Broadcaster, FanOut, SubscriberHub};
use crate::reset::{ResetController, ResetReport, SystemControl};
use crate::state::TouchState;
use crate::storage::{AggregationRecord, BoundedLog, CredentialStore, LineStore};
use crate::touch::{DebouncedTouchCounter, TouchSensor};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 16;

/// Requests from other tasks, applied at the start of a loop iteration
#[derive(Debug)]
pub enum NodeCommand {
    /// Raise the reset flag and report once the loop has serviced it
    Reset { reply: oneshot::Sender<ResetReport> },
    /// Count a touch that did not come from the sensor
    InjectTouch { reply: oneshot::Sender<Option<u64>> },
}

/// Read-only view of the loop state, refreshed every iteration
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub lifetime_count: u64,
    pub interval_count: u64,
    pub last_analysis_ms: u64,
    pub last_record: Option<AggregationRecord>,
    pub resets: u64,
}

/// Collaborators the node is wired to
pub struct NodeContext {
    pub store: Arc<dyn LineStore>,
    pub sensor: Box<dyn TouchSensor>,
    pub signal: Arc<ResetSignal>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: Arc<EventBus>,
    pub system: Arc<dyn SystemControl>,
}

/// The cooperative control loop.
///
/// Owns the touch state; every mutation happens on the task running
/// [`TouchNode::run`]. Other tasks go through a [`NodeHandle`].
pub struct TouchNode {
    state: TouchState,
    counter: DebouncedTouchCounter<Box<dyn TouchSensor>>,
    aggregation: AggregationLog,
    fanout: FanOut,
    reset: ResetController,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    commands: mpsc::Receiver<NodeCommand>,
    pending_resets: Vec<oneshot::Sender<ResetReport>>,
    snapshot_tx: watch::Sender<NodeSnapshot>,
    last_record: Option<AggregationRecord>,
    resets: u64,
}

impl TouchNode {
    pub fn new(config: &TouchnodeConfig, ctx: NodeContext) -> (Self, NodeHandle) {
        let log = BoundedLog::new(
            Arc::clone(&ctx.store),
            config.storage.log_resource.clone(),
            config.aggregation.max_entries,
        );

        let counter = DebouncedTouchCounter::new(
            ctx.sensor,
            config.sensor.touch_threshold,
            config.sensor.debounce_ms,
        )
        .with_event_bus(Arc::clone(&ctx.event_bus));

        let aggregation = AggregationLog::new(log.clone(), config.aggregation.interval_ms)
            .with_event_bus(Arc::clone(&ctx.event_bus));

        let hub = SubscriberHub::new(config.fanout.channel_capacity);
        let fanout = FanOut::new(
            Arc::new(hub.clone()),
            config.fanout.push_interval_ms,
            config.fanout.format,
        );

        let mut reset = ResetController::new(Arc::clone(&ctx.signal), log.clone())
            .with_event_bus(Arc::clone(&ctx.event_bus));
        if config.reset.factory {
            let credentials = CredentialStore::new(
                Arc::clone(&ctx.store),
                config.storage.ssid_resource.clone(),
                config.storage.password_resource.clone(),
            );
            reset = reset.with_factory_reset(credentials, ctx.system);
        }

        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let (snapshot_tx, snapshot_rx) = watch::channel(NodeSnapshot::default());

        let node = Self {
            state: TouchState::new(),
            counter,
            aggregation,
            fanout,
            reset,
            clock: ctx.clock,
            poll_interval: config.sensor.poll_interval(),
            commands,
            pending_resets: Vec::new(),
            snapshot_tx,
            last_record: None,
            resets: 0,
        };

        let handle = NodeHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            log,
            hub,
            signal: ctx.signal,
        };

        (node, handle)
    }

    pub fn state(&self) -> &TouchState {
        &self.state
    }

    /// One pass of the loop: commands, touch sample, push, aggregation, reset
    pub async fn run_once(&mut self) {
        let now_ms = self.clock.now_ms();

        self.drain_commands(now_ms);

        self.counter.sample(now_ms, &mut self.state);

        self.fanout.maybe_push(now_ms, &self.state);

        match self.aggregation.tick(now_ms, &mut self.state).await {
            TickOutcome::Persisted(record) => {
                self.last_record = Some(record);
                self.fanout.stage_record(record);
            }
            TickOutcome::Dropped(record) => {
                debug!("Record {} dropped, not staged for subscribers", record);
            }
            TickOutcome::Idle => {}
        }

        let report = self
            .reset
            .service_reset(now_ms, &mut self.state, &mut self.fanout)
            .await;
        if report.is_some() {
            self.last_record = None;
            self.resets += 1;
        }

        self.publish_snapshot();

        // Replies go out after the snapshot so callers observe the reset
        if let Some(report) = report {
            for reply in self.pending_resets.drain(..) {
                let _ = reply.send(report);
            }
        }
    }

    /// Run until cancelled, one iteration per poll interval
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Touch node running (poll every {:?}, reset {})",
            self.poll_interval,
            if self.reset.is_factory_reset() {
                "clears credentials and restarts"
            } else {
                "clears data only"
            }
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.run_once().await,
            }
        }

        info!(
            "Touch node stopped (lifetime count {})",
            self.state.lifetime_count()
        );
        Ok(())
    }

    fn drain_commands(&mut self, now_ms: u64) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                NodeCommand::Reset { reply } => {
                    info!("Remote reset requested");
                    self.reset.signal().request();
                    self.pending_resets.push(reply);
                }
                NodeCommand::InjectTouch { reply } => {
                    let counted = self.counter.inject(now_ms, &mut self.state);
                    let _ = reply.send(counted);
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = NodeSnapshot {
            lifetime_count: self.state.lifetime_count(),
            interval_count: self.state.interval_count(),
            last_analysis_ms: self.aggregation.last_analysis_ms(),
            last_record: self.last_record,
            resets: self.resets,
        };

        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Cloneable access to a running [`TouchNode`]
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    snapshots: watch::Receiver<NodeSnapshot>,
    log: BoundedLog,
    hub: SubscriberHub,
    signal: Arc<ResetSignal>,
}

impl NodeHandle {
    /// Ask the loop for a reset and wait until it has been serviced
    pub async fn request_reset(&self) -> Result<ResetReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(NodeCommand::Reset { reply })
            .await
            .map_err(|_| loop_stopped())?;
        response.await.map_err(|_| loop_stopped())
    }

    /// Raise the reset flag without waiting for the loop
    pub fn trigger_reset(&self) {
        self.signal.request();
    }

    /// Count one touch through the debounce window, returning the new
    /// lifetime count if it was accepted
    pub async fn inject_touch(&self) -> Result<Option<u64>> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(NodeCommand::InjectTouch { reply })
            .await
            .map_err(|_| loop_stopped())?;
        response.await.map_err(|_| loop_stopped())
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        *self.snapshots.borrow()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<NodeSnapshot> {
        self.snapshots.clone()
    }

    pub async fn records(&self) -> std::result::Result<Vec<AggregationRecord>, StorageError> {
        self.log.records().await
    }

    /// The data-fetch response body
    pub async fn render_data_json(&self) -> String {
        self.log.render_json().await
    }

    /// Join the live channel
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.hub.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

fn loop_stopped() -> TouchnodeError {
    warn!("Touch node loop is not running");
    TouchnodeError::component("touch_node", "control loop is not running")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PushFormat;
    use crate::fanout::LiveMessage;
    use crate::storage::{Credentials, MemoryLineStore};
    use crate::touch::ScriptedTouchSensor;
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

    struct Harness {
        node: TouchNode,
        handle: NodeHandle,
        sensor: ScriptedTouchSensor,
        clock: Arc<ManualClock>,
        store: Arc<MemoryLineStore>,
        signal: Arc<ResetSignal>,
        system: Arc<RecordingSystem>,
    }

    fn test_config() -> TouchnodeConfig {
        let mut config = TouchnodeConfig::default();
        config.aggregation.interval_ms = 60_000;
        config.aggregation.max_entries = 3;
        config.fanout.push_interval_ms = 1000;
        config.sensor.poll_interval_ms = 1;
        config
    }

    fn harness(config: &TouchnodeConfig) -> Harness {
        let sensor = ScriptedTouchSensor::new(100);
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(MemoryLineStore::new());
        let signal = Arc::new(ResetSignal::new());
        let system = Arc::new(RecordingSystem::default());

        let (node, handle) = TouchNode::new(
            config,
            NodeContext {
                store: store.clone(),
                sensor: Box::new(sensor.clone()),
                signal: Arc::clone(&signal),
                clock: clock.clone(),
                event_bus: Arc::new(EventBus::new(16)),
                system: system.clone(),
            },
        );

        Harness {
            node,
            handle,
            sensor,
            clock,
            store,
            signal,
            system,
        }
    }

    #[tokio::test]
    async fn test_touches_flow_into_log_and_snapshot() {
        let mut h = harness(&test_config());

        for (at, reading) in [(100, 10), (700, 90), (1300, 5)] {
            h.clock.set(at);
            h.sensor.push_reading(reading);
            h.node.run_once().await;
        }
        assert_eq!(h.handle.snapshot().lifetime_count, 2);

        h.clock.set(60_000);
        h.node.run_once().await;

        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.interval_count, 0);
        assert_eq!(
            snapshot.last_record,
            Some(AggregationRecord::new(60_000, 2, 2))
        );
        assert_eq!(
            h.handle.render_data_json().await,
            r#"[{"timestamp":60000,"touchCount":2,"touchRate":2}]"#
        );
    }

    #[tokio::test]
    async fn test_count_pushes_reach_subscribers() {
        let mut h = harness(&test_config());
        let mut live = h.handle.subscribe();
        assert_eq!(h.handle.subscriber_count(), 1);

        h.sensor.push_reading(0);
        h.clock.set(10);
        h.node.run_once().await;

        h.clock.set(500);
        h.node.run_once().await;

        assert_eq!(live.recv().await.unwrap(), "1");
        assert!(live.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_record_format_pushes_new_records() {
        let mut config = test_config();
        config.fanout.format = PushFormat::Record;
        let mut h = harness(&config);
        let mut live = h.handle.subscribe();

        h.clock.set(60_000);
        h.node.run_once().await;
        h.clock.set(60_010);
        h.node.run_once().await;

        let frame = live.recv().await.unwrap();
        assert_eq!(
            LiveMessage::from_frame(&frame),
            Some(LiveMessage::Record(AggregationRecord::new(60_000, 0, 0)))
        );
    }

    #[tokio::test]
    async fn test_touch_in_same_iteration_as_reset_is_zeroed() {
        let mut h = harness(&test_config());

        h.sensor.push_reading(0);
        h.clock.set(100);
        h.node.run_once().await;
        assert_eq!(h.node.state().lifetime_count(), 1);

        h.signal.request();
        h.sensor.push_reading(0);
        h.clock.set(1000);
        h.node.run_once().await;

        assert_eq!(*h.node.state(), TouchState::default());
        let snapshot = h.handle.snapshot();
        assert_eq!(snapshot.lifetime_count, 0);
        assert_eq!(snapshot.resets, 1);
    }

    #[tokio::test]
    async fn test_remote_reset_through_running_loop() {
        let h = harness(&test_config());
        let Harness {
            node,
            handle,
            sensor,
            clock,
            store,
            ..
        } = h;

        sensor.push_reading(0);
        clock.set(60_000);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(node.run(cancel.clone()));

        let mut live = handle.subscribe();
        let mut snapshots = handle.watch_snapshots();
        snapshots
            .wait_for(|s| s.last_record.is_some())
            .await
            .unwrap();
        assert!(!handle.records().await.unwrap().is_empty());

        let report = handle.request_reset().await.unwrap();
        assert!(report.log_cleared);
        assert!(report.subscribers_notified);
        assert!(!report.restart_requested);

        assert_eq!(handle.snapshot().lifetime_count, 0);
        assert_eq!(handle.snapshot().last_record, None);
        assert!(!store.contains("data.csv"));
        assert_eq!(handle.render_data_json().await, "[]");

        let mut frames = Vec::new();
        while let Ok(frame) = live.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames.last().map(String::as_str), Some("reset"));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_inject_touch_through_running_loop() {
        let h = harness(&test_config());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(h.node.run(cancel.clone()));

        assert_eq!(h.handle.inject_touch().await.unwrap(), Some(1));
        // Same clock reading, still inside the debounce window
        assert_eq!(h.handle.inject_touch().await.unwrap(), None);

        h.clock.advance(500);
        assert_eq!(h.handle.inject_touch().await.unwrap(), Some(2));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_button_flag_serviced_by_loop() {
        let mut h = harness(&test_config());
        h.clock.set(60_000);
        h.node.run_once().await;
        assert!(h.store.contains("data.csv"));

        h.handle.trigger_reset();
        h.node.run_once().await;

        assert!(!h.store.contains("data.csv"));
        assert!(!h.signal.is_requested());
    }

    #[tokio::test]
    async fn test_factory_reset_restarts() {
        let mut config = test_config();
        config.reset.factory = true;
        let mut h = harness(&config);

        let credentials = CredentialStore::new(h.store.clone(), "ssid.txt", "pass.txt");
        credentials
            .save(&Credentials::new("barn", "secret"))
            .await
            .unwrap();

        h.signal.request();
        h.node.run_once().await;

        assert!(credentials.load().await.unwrap().is_none());
        assert_eq!(*h.system.restarts.lock(), vec!["factory reset".to_string()]);
    }

    #[tokio::test]
    async fn test_handle_reports_stopped_loop() {
        let h = harness(&test_config());
        drop(h.node);

        assert!(h.handle.request_reset().await.is_err());
        assert!(h.handle.inject_touch().await.is_err());
    }
}

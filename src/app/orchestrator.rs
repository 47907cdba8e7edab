use super::types::{ComponentState, ShutdownReason};
use crate::button::ResetSignal;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{SensorKind, TouchnodeConfig};
use crate::error::Result;
use crate::events::{EventBus, EventFilter, EventReceiver};
use crate::keyboard_input::KeyboardInputHandler;
use crate::node::{NodeContext, NodeHandle, TouchNode};
use crate::provisioning::NetworkMode;
use crate::reset::ProcessRestart;
use crate::storage::{CredentialStore, FsLineStore, LineStore};
use crate::touch::{FileTouchSensor, ScriptedTouchSensor, TouchSensor};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main application coordinator that manages all system components
pub struct TouchnodeOrchestrator {
    pub(super) config: TouchnodeConfig,
    pub(super) event_bus: Arc<EventBus>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) signal: Arc<ResetSignal>,
    pub(super) credentials: CredentialStore,

    // Components
    pub(super) node: Option<TouchNode>,
    pub(super) handle: NodeHandle,
    pub(super) network_mode: Option<NetworkMode>,
    pub(super) keyboard_enabled: bool,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) tasks: Vec<(&'static str, JoinHandle<()>)>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) shutdown_events: Option<EventReceiver>,
    pub(super) cancellation_token: CancellationToken,
}

impl TouchnodeOrchestrator {
    /// Create an orchestrator backed by the configured data directory and sensor
    pub async fn new(config: TouchnodeConfig) -> Result<Self> {
        let store: Arc<dyn LineStore> = Arc::new(FsLineStore::new(config.storage.data_path()));

        let sensor: Box<dyn TouchSensor> = match config.sensor.kind {
            SensorKind::File => Box::new(FileTouchSensor::new(&config.sensor.path)),
            SensorKind::Simulated => {
                info!("Using simulated touch sensor; touches come from debug input only");
                Box::new(ScriptedTouchSensor::new(u32::MAX))
            }
        };

        Self::with_parts(config, store, sensor).await
    }

    /// Create an orchestrator around an explicit store and sensor
    pub async fn with_parts(
        config: TouchnodeConfig,
        store: Arc<dyn LineStore>,
        sensor: Box<dyn TouchSensor>,
    ) -> Result<Self> {
        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let signal = Arc::new(ResetSignal::new());
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        // Subscribed before any component runs so an early request is not missed
        let shutdown_events = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "orchestrator".to_string(),
        );

        let credentials = CredentialStore::new(
            Arc::clone(&store),
            config.storage.ssid_resource.clone(),
            config.storage.password_resource.clone(),
        );

        let (node, handle) = TouchNode::new(
            &config,
            NodeContext {
                store,
                sensor,
                signal: Arc::clone(&signal),
                clock: Arc::clone(&clock),
                event_bus: Arc::clone(&event_bus),
                system: Arc::new(ProcessRestart::new(Arc::clone(&event_bus))),
            },
        );

        Ok(Self {
            config,
            event_bus,
            clock,
            signal,
            credentials,
            node: Some(node),
            handle,
            network_mode: None,
            keyboard_enabled: false,
            keyboard_handler: None,
            tasks: Vec::new(),
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            shutdown_events: Some(shutdown_events),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Network mode chosen during initialization
    pub fn network_mode(&self) -> Option<&NetworkMode> {
        self.network_mode.as_ref()
    }
}

pub mod aggregation;
pub mod app;
pub mod button;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod keyboard_input;
pub mod node;
pub mod provisioning;
pub mod reset;
pub mod state;
pub mod storage;
pub mod touch;

#[cfg(feature = "web")]
pub mod web;

pub use aggregation::{AggregationLog, TickOutcome};
pub use app::{ComponentState, ShutdownReason, TouchnodeOrchestrator};
pub use button::{ButtonInputHandler, ButtonLevel, LongPressDetector, ResetSignal};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{PushFormat, TouchnodeConfig};
pub use error::{Result, TouchnodeError};
pub use events::{EventBus, EventFilter, EventReceiver, NodeEvent};
pub use fanout::{Broadcaster, FanOut, LiveMessage, SubscriberHub};
pub use node::{NodeCommand, NodeContext, NodeHandle, NodeSnapshot, TouchNode};
pub use provisioning::{provision, HostNetworkLink, NetworkLink, NetworkMode};
pub use reset::{ProcessRestart, ResetController, ResetReport, SystemControl};
pub use state::TouchState;
pub use storage::{AggregationRecord, BoundedLog, CredentialStore, Credentials, FsLineStore, LineStore};
pub use touch::{DebouncedTouchCounter, FileTouchSensor, ScriptedTouchSensor, TouchSensor};

#[cfg(feature = "web")]
pub use web::{build_router, WebServer};

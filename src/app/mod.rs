mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::TouchnodeOrchestrator;
pub use types::{ComponentState, ShutdownReason, EXIT_FAILURE, EXIT_OK, EXIT_RESTART};

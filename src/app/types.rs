/// Clean stop
pub const EXIT_OK: i32 = 0;
/// A component failed or shutdown did not complete
pub const EXIT_FAILURE: i32 = 1;
/// Restart requested; the service manager is expected to relaunch (EX_TEMPFAIL)
pub const EXIT_RESTART: i32 = 75;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
    Restart(String),
}

impl ShutdownReason {
    /// Exit code before accounting for components that failed to stop
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => EXIT_OK,
            ShutdownReason::Error(_) => EXIT_FAILURE,
            ShutdownReason::Restart(_) => EXIT_RESTART,
        }
    }
}

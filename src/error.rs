use thiserror::Error;

#[derive(Error, Debug)]
pub enum TouchnodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Button error: {0}")]
    Button(#[from] ButtonError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl TouchnodeError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures of the persistent line store and of the records kept in it
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable for '{resource}': {source}")]
    Unavailable {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record '{line}': {details}")]
    MalformedRecord { line: String, details: String },

    #[error("Value for '{resource}' rejected: {details}")]
    InvalidValue { resource: String, details: String },
}

impl StorageError {
    pub fn unavailable<S: Into<String>>(resource: S, source: std::io::Error) -> Self {
        Self::Unavailable {
            resource: resource.into(),
            source,
        }
    }

    pub fn malformed<L: Into<String>, D: Into<String>>(line: L, details: D) -> Self {
        Self::MalformedRecord {
            line: line.into(),
            details: details.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum SensorError {
    #[error("Failed to read sensor {source_path}: {details}")]
    Read { source_path: String, details: String },

    #[error("Sensor {source_path} produced an invalid value '{value}'")]
    InvalidValue { source_path: String, value: String },
}

#[derive(Error, Debug, Clone)]
pub enum ButtonError {
    #[error("Button device not found: {0}")]
    DeviceNotFound(String),

    #[error("Permission denied for button device: {0}")]
    PermissionDenied(String),

    #[error("Button device error: {0}")]
    Device(String),

    #[error("Button input not available on this system")]
    NotAvailable,
}

impl ButtonError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ButtonError::Device(_) | ButtonError::DeviceNotFound(_))
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed: {details}")]
    Serve { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TouchnodeError>;

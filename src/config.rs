use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TouchnodeConfig {
    pub sensor: SensorConfig,
    pub button: ButtonConfig,
    pub aggregation: AggregationConfig,
    pub fanout: FanOutConfig,
    pub reset: ResetConfig,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
    pub system: SystemConfig,
}

/// Where raw capacitive readings come from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Decimal value read from a sysfs/IIO attribute file
    File,
    /// No hardware; idle readings only (touches arrive via keyboard injection)
    Simulated,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_kind")]
    pub kind: SensorKind,

    /// Attribute file holding the raw capacitive value
    #[serde(default = "default_sensor_path")]
    pub path: String,

    /// Readings strictly below this value count as a touch
    #[serde(default = "default_touch_threshold")]
    pub touch_threshold: u32,

    /// Window after an accepted touch during which the sensor is ignored
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Period of the cooperative loop
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ButtonConfig {
    #[serde(default = "default_button_enabled")]
    pub enabled: bool,

    /// Input device carrying the reset button
    #[serde(default = "default_button_device")]
    pub device: String,

    /// evdev key code of the reset button (BTN_0 by default)
    #[serde(default = "default_button_key_code")]
    pub key_code: u16,

    /// Minimum hold duration that requests a reset
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AggregationConfig {
    #[serde(default = "default_aggregation_interval_ms")]
    pub interval_ms: u64,

    /// Capacity of the persisted log
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

/// Frame format of the live channel, fixed per deployment
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PushFormat {
    /// Bare lifetime count, e.g. `42`
    Count,
    /// `New_Data:{...}` for each newly persisted record
    Record,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FanOutConfig {
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,

    #[serde(default = "default_push_format")]
    pub format: PushFormat,

    /// Frames buffered per subscriber before it starts missing messages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResetConfig {
    /// Also wipe stored network credentials and restart after a reset
    #[serde(default = "default_factory_reset")]
    pub factory: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_resource")]
    pub log_resource: String,

    #[serde(default = "default_ssid_resource")]
    pub ssid_resource: String,

    #[serde(default = "default_password_resource")]
    pub password_resource: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_server_ip")]
    pub ip: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl SensorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl TouchnodeConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("touchnode.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("sensor.kind", "file")?
            .set_default("sensor.path", default_sensor_path())?
            .set_default("sensor.touch_threshold", default_touch_threshold())?
            .set_default("sensor.debounce_ms", default_debounce_ms() as i64)?
            .set_default("sensor.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("button.enabled", default_button_enabled())?
            .set_default("button.device", default_button_device())?
            .set_default("button.key_code", default_button_key_code() as i64)?
            .set_default("button.hold_ms", default_hold_ms() as i64)?
            .set_default("aggregation.interval_ms", default_aggregation_interval_ms() as i64)?
            .set_default("aggregation.max_entries", default_max_entries() as i64)?
            .set_default("fanout.push_interval_ms", default_push_interval_ms() as i64)?
            .set_default("fanout.format", "count")?
            .set_default("fanout.channel_capacity", default_channel_capacity() as i64)?
            .set_default("reset.factory", default_factory_reset())?
            .set_default("storage.data_dir", default_data_dir())?
            .set_default("storage.log_resource", default_log_resource())?
            .set_default("storage.ssid_resource", default_ssid_resource())?
            .set_default("storage.password_resource", default_password_resource())?
            .set_default("network.connect_timeout_ms", default_connect_timeout_ms() as i64)?
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // TOUCHNODE_SENSOR__TOUCH_THRESHOLD=30 and friends
            .add_source(
                Environment::with_prefix("TOUCHNODE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: TouchnodeConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor.kind == SensorKind::File && self.sensor.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Sensor path must be set for the file sensor".to_string(),
            ));
        }

        if self.sensor.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Sensor poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.button.hold_ms == 0 {
            return Err(ConfigError::Message(
                "Button hold_ms must be greater than 0".to_string(),
            ));
        }

        if self.aggregation.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Aggregation interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.aggregation.max_entries == 0 {
            return Err(ConfigError::Message(
                "Aggregation max_entries must be greater than 0".to_string(),
            ));
        }

        if self.fanout.push_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Fan-out push_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.fanout.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Fan-out channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.storage.log_resource.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage log_resource must not be empty".to_string(),
            ));
        }

        if self.storage.ssid_resource == self.storage.log_resource
            || self.storage.password_resource == self.storage.log_resource
        {
            return Err(ConfigError::Message(
                "Credential resources must differ from the log resource".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for TouchnodeConfig {
    fn default() -> Self {
        Self {
            sensor: SensorConfig {
                kind: default_sensor_kind(),
                path: default_sensor_path(),
                touch_threshold: default_touch_threshold(),
                debounce_ms: default_debounce_ms(),
                poll_interval_ms: default_poll_interval_ms(),
            },
            button: ButtonConfig {
                enabled: default_button_enabled(),
                device: default_button_device(),
                key_code: default_button_key_code(),
                hold_ms: default_hold_ms(),
            },
            aggregation: AggregationConfig {
                interval_ms: default_aggregation_interval_ms(),
                max_entries: default_max_entries(),
            },
            fanout: FanOutConfig {
                push_interval_ms: default_push_interval_ms(),
                format: default_push_format(),
                channel_capacity: default_channel_capacity(),
            },
            reset: ResetConfig {
                factory: default_factory_reset(),
            },
            storage: StorageConfig {
                data_dir: default_data_dir(),
                log_resource: default_log_resource(),
                ssid_resource: default_ssid_resource(),
                password_resource: default_password_resource(),
            },
            network: NetworkConfig {
                connect_timeout_ms: default_connect_timeout_ms(),
            },
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_sensor_kind() -> SensorKind {
    SensorKind::File
}
fn default_sensor_path() -> String {
    "/sys/bus/iio/devices/iio:device0/in_voltage0_raw".to_string()
}
fn default_touch_threshold() -> u32 {
    40
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    10
}

fn default_button_enabled() -> bool {
    true
}
fn default_button_device() -> String {
    "/dev/input/event0".to_string()
}
fn default_button_key_code() -> u16 {
    0x100
}
fn default_hold_ms() -> u64 {
    5000
}

fn default_aggregation_interval_ms() -> u64 {
    60_000
}
fn default_max_entries() -> usize {
    100
}

fn default_push_interval_ms() -> u64 {
    1000
}
fn default_push_format() -> PushFormat {
    PushFormat::Count
}
fn default_channel_capacity() -> usize {
    32
}

fn default_factory_reset() -> bool {
    false
}

fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_log_resource() -> String {
    "data.csv".to_string()
}
fn default_ssid_resource() -> String {
    "ssid.txt".to_string()
}
fn default_password_resource() -> String {
    "pass.txt".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8080
}

fn default_event_bus_capacity() -> usize {
    100
}

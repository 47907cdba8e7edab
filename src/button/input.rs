use super::detector::LongPressDetector;
use crate::clock::Clock;
use crate::config::ButtonConfig;
use crate::events::EventBus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(all(feature = "button", target_os = "linux"))]
use {
    crate::error::ButtonError,
    crate::events::NodeEvent,
    evdev::{Device, EventType, InputEventKind, Key},
    tokio::sync::oneshot,
    tokio::time::sleep,
    tracing::{debug, error, info, warn},
};

#[cfg(not(all(feature = "button", target_os = "linux")))]
use tracing::warn;

/// Reads the physical reset button from an input device
#[cfg_attr(not(all(feature = "button", target_os = "linux")), allow(dead_code))]
pub struct ButtonInputHandler {
    device_path: String,
    key_code: u16,
    detector: LongPressDetector,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ButtonInputHandler {
    pub fn new(
        config: &ButtonConfig,
        detector: LongPressDetector,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            device_path: config.device.clone(),
            key_code: config.key_code,
            detector,
            clock,
            event_bus,
            max_retries: 10,
            retry_delay: Duration::from_secs(5),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Start watching the button. The returned task ends when the token
    /// fires or the device keeps failing.
    #[cfg(all(feature = "button", target_os = "linux"))]
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        info!(
            "Starting reset button handler for device {} (key code {:#x}, hold {} ms)",
            self.device_path,
            self.key_code,
            self.detector.hold_ms()
        );

        let device_path = self.device_path.clone();
        let key_code = self.key_code;
        let detector = self.detector.clone();
        let clock = Arc::clone(&self.clock);
        let event_bus = Arc::clone(&self.event_bus);
        let max_retries = self.max_retries;
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            let mut retry_count = 0;

            loop {
                let path = device_path.clone();
                let detector = detector.clone();
                let clock = Arc::clone(&clock);
                let token = cancel.clone();

                // Plain thread: a reader parked in fetch_events must not hold up process exit
                let (result_tx, result_rx) = oneshot::channel();
                let spawned = std::thread::Builder::new()
                    .name("reset-button".to_string())
                    .spawn(move || {
                        let result =
                            monitor_button_device(&path, key_code, &detector, clock.as_ref(), &token);
                        let _ = result_tx.send(result);
                    });

                let outcome = match spawned {
                    Ok(_) => tokio::select! {
                        result = result_rx => result.unwrap_or_else(|_| {
                            Err(ButtonError::Device("reader thread exited unexpectedly".to_string()))
                        }),
                        _ = cancel.cancelled() => break,
                    },
                    Err(e) => Err(ButtonError::Device(format!(
                        "failed to spawn reader thread: {}",
                        e
                    ))),
                };

                match outcome {
                    Ok(()) => {
                        info!("Reset button monitoring ended");
                        break;
                    }
                    Err(e) => {
                        error!("Reset button error: {}", e);
                        retry_count += 1;

                        let _ = event_bus.publish(NodeEvent::SystemError {
                            component: "reset_button".to_string(),
                            error: format!("Attempt {}/{}: {}", retry_count, max_retries, e),
                        });

                        if !e.is_recoverable() || retry_count >= max_retries {
                            error!(
                                "Reset button handler giving up after {} attempts",
                                retry_count
                            );
                            break;
                        }

                        let delay = retry_delay * 2_u32.pow(retry_count.min(5));
                        warn!(
                            "Retrying reset button device in {:?} (attempt {}/{})",
                            delay, retry_count, max_retries
                        );

                        tokio::select! {
                            _ = sleep(delay) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
            }
        })
    }

    #[cfg(not(all(feature = "button", target_os = "linux")))]
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        warn!(
            "Reset button input not available in this build; {} is ignored and only remote resets work",
            self.device_path
        );
        tokio::spawn(async move { cancel.cancelled().await })
    }
}

/// Translate an evdev key value into a level; auto-repeat (2) is not an edge
pub fn level_from_key_value(value: i32) -> Option<super::ButtonLevel> {
    match value {
        1 => Some(super::ButtonLevel::Pressed),
        0 => Some(super::ButtonLevel::Released),
        _ => None,
    }
}

#[cfg(all(feature = "button", target_os = "linux"))]
fn monitor_button_device(
    device_path: &str,
    key_code: u16,
    detector: &LongPressDetector,
    clock: &dyn Clock,
    cancel: &CancellationToken,
) -> Result<(), ButtonError> {
    let mut device = Device::open(device_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ButtonError::DeviceNotFound(device_path.to_string()),
        std::io::ErrorKind::PermissionDenied => {
            ButtonError::PermissionDenied(device_path.to_string())
        }
        _ => ButtonError::Device(format!("Failed to open {}: {}", device_path, e)),
    })?;

    info!(
        "Reset button device opened: {} ({})",
        device_path,
        device.name().unwrap_or("Unknown")
    );

    if !device.supported_events().contains(EventType::KEY) {
        return Err(ButtonError::Device(format!(
            "{} does not support key events",
            device_path
        )));
    }

    let key = Key::new(key_code);
    if let Some(keys) = device.supported_keys() {
        if !keys.contains(key) {
            warn!(
                "Device {} does not advertise key {:?}, monitoring anyway",
                device_path, key
            );
        }
    }

    let mut consecutive_errors = 0;
    const MAX_CONSECUTIVE_ERRORS: u32 = 5;

    while !cancel.is_cancelled() {
        match device.fetch_events() {
            Ok(events) => {
                consecutive_errors = 0;

                for event in events {
                    let InputEventKind::Key(pressed) = event.kind() else {
                        continue;
                    };
                    if pressed != key {
                        continue;
                    }
                    if let Some(level) = level_from_key_value(event.value()) {
                        debug!("Reset button edge: {:?}", level);
                        detector.on_edge(level, clock.now_ms());
                    }
                }
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(ButtonError::Device(format!(
                        "Too many consecutive errors reading {}: {}",
                        device_path, e
                    )));
                }
                warn!(
                    "Error reading reset button (attempt {}): {}",
                    consecutive_errors, e
                );
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        }
    }

    Ok(())
}

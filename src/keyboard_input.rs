use crate::error::Result;
use crate::events::{EventBus, NodeEvent};
use crate::node::NodeHandle;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a debug key press does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    InjectTouch,
    RequestReset,
    Quit,
    Ignore,
}

impl KeyAction {
    pub fn for_key(code: KeyCode) -> Self {
        match code {
            KeyCode::Char(' ') => KeyAction::InjectTouch,
            KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::RequestReset,
            KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
            _ => KeyAction::Ignore,
        }
    }
}

/// Keyboard input handler for exercising the node without hardware
pub struct KeyboardInputHandler {
    node: NodeHandle,
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(node: NodeHandle, event_bus: Arc<EventBus>, cancellation_token: CancellationToken) -> Self {
        Self {
            node,
            event_bus,
            cancellation_token,
        }
    }

    /// Start listening for keyboard input
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - SPACE touches, 'r' resets, 'q' quits");

        let node = self.node.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match KeyAction::for_key(key_event.code) {
                            KeyAction::InjectTouch => {
                                let node = node.clone();
                                runtime_handle.spawn(async move {
                                    match node.inject_touch().await {
                                        Ok(Some(count)) => info!("Simulated touch, counter: {}", count),
                                        Ok(None) => debug!("Simulated touch debounced"),
                                        Err(e) => warn!("Failed to inject touch: {}", e),
                                    }
                                });
                            }
                            KeyAction::RequestReset => {
                                info!("Reset key pressed");
                                node.trigger_reset();
                            }
                            KeyAction::Quit => {
                                info!("Quit key pressed - requesting shutdown");
                                let _ = event_bus.publish(NodeEvent::ShutdownRequested {
                                    reason: "User requested via keyboard".to_string(),
                                    restart: false,
                                });
                                break;
                            }
                            KeyAction::Ignore => {
                                debug!("Key pressed: {:?}", key_event.code);
                            }
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(KeyAction::for_key(KeyCode::Char(' ')), KeyAction::InjectTouch);
        assert_eq!(KeyAction::for_key(KeyCode::Char('r')), KeyAction::RequestReset);
        assert_eq!(KeyAction::for_key(KeyCode::Char('q')), KeyAction::Quit);
        assert_eq!(KeyAction::for_key(KeyCode::Esc), KeyAction::Quit);
        assert_eq!(KeyAction::for_key(KeyCode::Char('x')), KeyAction::Ignore);
        assert_eq!(KeyAction::for_key(KeyCode::Enter), KeyAction::Ignore);
    }
}

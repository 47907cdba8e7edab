use super::{ComponentState, TouchnodeOrchestrator};
use crate::button::{ButtonInputHandler, LongPressDetector};
use crate::error::{Result, TouchnodeError};
use crate::events::NodeEvent;
use crate::keyboard_input::KeyboardInputHandler;
use crate::provisioning::{provision, HostNetworkLink, NetworkMode};
use std::sync::Arc;
use tracing::{error, info, warn};

impl TouchnodeOrchestrator {
    /// Register components and decide the network mode
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing touchnode components");

        let mut states = self.component_states.lock().await;
        states.insert("node".to_string(), ComponentState::Stopped);

        if self.config.button.enabled {
            states.insert("button".to_string(), ComponentState::Stopped);
        }

        #[cfg(feature = "web")]
        states.insert("web".to_string(), ComponentState::Stopped);

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }

        drop(states);

        let mode = provision(
            &self.credentials,
            &HostNetworkLink,
            self.config.network.connect_timeout(),
        )
        .await;

        match &mode {
            NetworkMode::Station { ssid } => info!("Network mode: station ({})", ssid),
            NetworkMode::ConfigurationPortal => warn!(
                "Network mode: configuration portal; store credentials with `touchctl credentials set`"
            ),
        }
        self.network_mode = Some(mode);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting touchnode");

        let node = self
            .node
            .take()
            .ok_or_else(|| TouchnodeError::system("Touch node already started"))?;

        self.set_component_state("node", ComponentState::Starting)
            .await;

        let token = self.cancellation_token.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let states = Arc::clone(&self.component_states);
        self.tasks.push((
            "node",
            tokio::spawn(async move {
                if let Err(e) = node.run(token).await {
                    error!("Touch node error: {}", e);
                    states
                        .lock()
                        .await
                        .insert("node".to_string(), ComponentState::Failed);
                    let _ = event_bus.publish(NodeEvent::SystemError {
                        component: "node".to_string(),
                        error: e.to_string(),
                    });
                }
            }),
        ));

        self.set_component_state("node", ComponentState::Running)
            .await;
        info!(
            "Touch node started (threshold {}, debounce {:?}, aggregation every {} ms, {} entries max)",
            self.config.sensor.touch_threshold,
            self.config.sensor.debounce(),
            self.config.aggregation.interval_ms,
            self.config.aggregation.max_entries
        );

        if self.config.button.enabled {
            self.set_component_state("button", ComponentState::Starting)
                .await;

            let detector =
                LongPressDetector::new(Arc::clone(&self.signal), self.config.button.hold_ms);
            let handler = ButtonInputHandler::new(
                &self.config.button,
                detector,
                Arc::clone(&self.clock),
                Arc::clone(&self.event_bus),
            );
            self.tasks
                .push(("button", handler.start(self.cancellation_token.clone())));

            self.set_component_state("button", ComponentState::Running)
                .await;
        }

        #[cfg(feature = "web")]
        self.start_web_server().await;

        // Start keyboard input handler for debugging (only if enabled)
        if self.keyboard_enabled {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;

            let keyboard_handler = KeyboardInputHandler::new(
                self.handle.clone(),
                Arc::clone(&self.event_bus),
                self.cancellation_token.child_token(),
            );
            keyboard_handler.start().await.map_err(|e| {
                error!("Failed to start keyboard handler: {}", e);
                e
            })?;
            self.keyboard_handler = Some(keyboard_handler);

            self.set_component_state("keyboard", ComponentState::Running)
                .await;
        }

        info!("Touchnode started successfully");
        Ok(())
    }

    #[cfg(feature = "web")]
    async fn start_web_server(&mut self) {
        use crate::web::WebServer;

        self.set_component_state("web", ComponentState::Starting)
            .await;

        let server = WebServer::new(
            self.config.server.clone(),
            self.handle.clone(),
            Arc::clone(&self.event_bus),
        );
        let address = server.address();
        let token = self.cancellation_token.clone();
        let event_bus = Arc::clone(&self.event_bus);
        let states = Arc::clone(&self.component_states);

        self.tasks.push((
            "web",
            tokio::spawn(async move {
                if let Err(e) = server.start(token).await {
                    error!("Web server error: {}", e);
                    states
                        .lock()
                        .await
                        .insert("web".to_string(), ComponentState::Failed);
                    let _ = event_bus.publish(NodeEvent::SystemError {
                        component: "web_server".to_string(),
                        error: e.to_string(),
                    });
                    let _ = event_bus.publish(NodeEvent::ShutdownRequested {
                        reason: "web server failed".to_string(),
                        restart: false,
                    });
                }
            }),
        ));

        self.set_component_state("web", ComponentState::Running)
            .await;
        info!("Web server starting on {}", address);
    }
}

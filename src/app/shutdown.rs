use super::types::EXIT_FAILURE;
use super::{ComponentState, ShutdownReason, TouchnodeOrchestrator};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl TouchnodeOrchestrator {
    /// Stop every component and work out the process exit code
    pub async fn shutdown(&mut self, reason: ShutdownReason) -> crate::error::Result<i32> {
        info!("Beginning graceful shutdown");

        let failed_while_running = self.any_component_failed().await;

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = reason.exit_code();
        if failed_while_running && exit_code == 0 {
            exit_code = EXIT_FAILURE;
        }

        if let Some(keyboard_handler) = self.keyboard_handler.take() {
            self.set_component_state("keyboard", ComponentState::Stopping)
                .await;
            match timeout(Duration::from_secs(2), keyboard_handler.stop()).await {
                Ok(Ok(())) => {
                    self.set_component_state("keyboard", ComponentState::Stopped)
                        .await;
                }
                Ok(Err(e)) => {
                    error!("Error stopping keyboard: {}", e);
                    self.set_component_state("keyboard", ComponentState::Failed)
                        .await;
                }
                Err(_) => {
                    error!("keyboard component stop timeout");
                    self.set_component_state("keyboard", ComponentState::Failed)
                        .await;
                }
            }
        }

        // Reverse start order: front ends first, the loop last
        let mut tasks = std::mem::take(&mut self.tasks);
        while let Some((component, task)) = tasks.pop() {
            if !self.stop_component(component, task).await && exit_code == 0 {
                exit_code = EXIT_FAILURE;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for a cancelled component task. Returns false if it had to be abandoned.
    async fn stop_component(
        &self,
        component: &str,
        mut task: tokio::task::JoinHandle<()>,
    ) -> bool {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                true
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component task failed: {}", component, e);
                false
            }
            Err(_) => {
                task.abort();
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                false
            }
        }
    }
}

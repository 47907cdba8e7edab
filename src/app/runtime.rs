use super::{ShutdownReason, TouchnodeOrchestrator};
use crate::error::{EventBusError, Result, TouchnodeError};
use crate::events::{EventReceiver, NodeEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info, warn};

type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl TouchnodeOrchestrator {
    /// Run until a signal or a shutdown request arrives, then shut down.
    /// Returns the process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Touchnode is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| TouchnodeError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| TouchnodeError::system("Shutdown receiver already taken"))?;

        let shutdown_events = self
            .shutdown_events
            .take()
            .ok_or_else(|| TouchnodeError::system("Shutdown events already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(&shutdown_sender);
        self.watch_shutdown_requests(shutdown_events, &shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| TouchnodeError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown(shutdown_reason).await?;

        info!("Touchnode shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: &SharedShutdownSender) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    send_shutdown(
                        &shutdown_sender_sigterm,
                        ShutdownReason::Signal("SIGTERM".to_string()),
                    )
                    .await;
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(
                    &shutdown_sender_sigint,
                    ShutdownReason::Signal("SIGINT".to_string()),
                )
                .await;
            }
        });
    }

    /// Turn `ShutdownRequested` events from components into a shutdown
    fn watch_shutdown_requests(
        &self,
        mut shutdown_events: EventReceiver,
        shutdown_sender: &SharedShutdownSender,
    ) {
        let shutdown_sender = Arc::clone(shutdown_sender);
        let cancel = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = shutdown_events.recv() => event,
                    _ = cancel.cancelled() => return,
                };

                match event {
                    Ok(NodeEvent::ShutdownRequested { reason, restart }) => {
                        let reason = if restart {
                            ShutdownReason::Restart(reason)
                        } else {
                            ShutdownReason::UserRequest
                        };
                        send_shutdown(&shutdown_sender, reason).await;
                        return;
                    }
                    Ok(_) => {}
                    Err(EventBusError::Lagged { skipped }) => {
                        warn!("Shutdown watcher skipped {} events", skipped);
                    }
                    Err(_) => return,
                }
            }
        });
    }
}

async fn send_shutdown(sender: &SharedShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}

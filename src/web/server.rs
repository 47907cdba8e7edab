use crate::{
    config::ServerConfig,
    error::{Result, ServerError},
    events::EventBus,
    node::NodeHandle,
};
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::handlers::{
    dashboard_handler, data_handler, health_handler, live_socket_handler, reset_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) node: NodeHandle,
    pub(crate) event_bus: Arc<EventBus>,
}

impl ServerState {
    pub fn new(node: NodeHandle, event_bus: Arc<EventBus>) -> Self {
        Self { node, event_bus }
    }
}

/// Routes served to dashboards and admin tools
pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/data", get(data_handler))
        .route("/reset", get(reset_handler).post(reset_handler))
        .route("/ws", get(live_socket_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP/WebSocket front end of the node
pub struct WebServer {
    config: ServerConfig,
    state: ServerState,
}

impl WebServer {
    pub fn new(config: ServerConfig, node: NodeHandle, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            state: ServerState::new(node, event_bus),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Serve until the token fires
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let app = build_router(self.state.clone());
        let addr = self.address();

        info!("Starting web server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("Web server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
            .map_err(|e| ServerError::Serve {
                details: e.to_string(),
            })?;

        info!("Web server stopped");
        Ok(())
    }
}

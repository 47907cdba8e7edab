use crate::events::NodeEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::server::ServerState;

const RESET_DONE: &str = "Data has been reset.";

/// Whole bounded log as `[{timestamp, touchCount, touchRate}]`, oldest first
pub async fn data_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let body = state.node.render_data_json().await;
    ([(header::CONTENT_TYPE, "application/json")], body)
}

/// Reset through the control loop, same path as the physical button
pub async fn reset_handler(State(state): State<ServerState>) -> impl IntoResponse {
    match state.node.request_reset().await {
        Ok(report) => {
            info!(
                "Reset over HTTP (log cleared: {}, subscribers notified: {})",
                report.log_cleared, report.subscribers_notified
            );
            (StatusCode::OK, RESET_DONE)
        }
        Err(e) => {
            error!("HTTP reset failed: {}", e);
            let _ = state.event_bus.publish(NodeEvent::SystemError {
                component: "web_server".to_string(),
                error: format!("Reset request failed: {}", e),
            });
            (StatusCode::SERVICE_UNAVAILABLE, "Reset unavailable.")
        }
    }
}

/// Live channel: every hub frame becomes a text message
pub async fn live_socket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_live_frames(socket, state))
}

async fn forward_live_frames(socket: WebSocket, state: ServerState) {
    let client_id = Uuid::new_v4();
    let mut frames = state.node.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!(
        "Live client {} connected ({} subscribers)",
        client_id,
        state.node.subscriber_count()
    );

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Live client {} missed {} frames", client_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Live client {} disconnected", client_id);
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.node.snapshot();

    let health_info = serde_json::json!({
        "status": "healthy",
        "lifetime_count": snapshot.lifetime_count,
        "interval_count": snapshot.interval_count,
        "last_analysis_ms": snapshot.last_analysis_ms,
        "last_record": snapshot.last_record.map(|r| r.to_data_point()),
        "resets": snapshot.resets,
        "subscribers": state.node.subscriber_count(),
    });

    (StatusCode::OK, axum::Json(health_info))
}

pub async fn dashboard_handler() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Touch Node</title>
    <style>
        body { font-family: sans-serif; margin: 2em; background: #fafafa; }
        #count { font-size: 4em; margin: 0.2em 0; }
        table { border-collapse: collapse; }
        td, th { padding: 0.2em 1em; border-bottom: 1px solid #ddd; text-align: right; }
        button { margin-top: 1em; }
    </style>
</head>
<body>
    <h1>Touch Node</h1>
    <div>Touches since reset</div>
    <div id="count">-</div>
    <table>
        <thead><tr><th>Time (ms)</th><th>Total</th><th>Per interval</th></tr></thead>
        <tbody id="history"></tbody>
    </table>
    <button id="reset">Reset data</button>
    <script>
        const history = document.getElementById('history');
        const count = document.getElementById('count');

        function addRow(point) {
            const row = history.insertRow(0);
            row.insertCell().textContent = point.timestamp;
            row.insertCell().textContent = point.touchCount;
            row.insertCell().textContent = point.touchRate;
            count.textContent = point.touchCount;
        }

        function load() {
            history.innerHTML = '';
            fetch('/data').then(r => r.json()).then(points => points.forEach(addRow));
        }

        function connect() {
            const ws = new WebSocket(`ws://${location.host}/ws`);
            ws.onmessage = (msg) => {
                if (msg.data === 'reset') {
                    history.innerHTML = '';
                    count.textContent = '0';
                } else if (msg.data.startsWith('New_Data:')) {
                    addRow(JSON.parse(msg.data.slice('New_Data:'.length)));
                } else {
                    count.textContent = msg.data;
                }
            };
            ws.onclose = () => setTimeout(connect, 2000);
        }

        document.getElementById('reset').onclick = () => fetch('/reset', { method: 'POST' });

        load();
        connect();
    </script>
</body>
</html>
"#;

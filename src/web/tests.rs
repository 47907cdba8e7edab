use super::*;
use crate::button::ResetSignal;
use crate::clock::ManualClock;
use crate::config::TouchnodeConfig;
use crate::events::EventBus;
use crate::node::{NodeContext, NodeHandle, TouchNode};
use crate::reset::ProcessRestart;
use crate::storage::MemoryLineStore;
use crate::touch::ScriptedTouchSensor;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestNode {
    router: Router,
    handle: NodeHandle,
    store: Arc<MemoryLineStore>,
    cancel: CancellationToken,
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn start_node() -> TestNode {
    let mut config = TouchnodeConfig::default();
    config.sensor.poll_interval_ms = 1;

    let store = Arc::new(MemoryLineStore::new());
    let event_bus = Arc::new(EventBus::new(16));
    let (node, handle) = TouchNode::new(
        &config,
        NodeContext {
            store: store.clone(),
            sensor: Box::new(ScriptedTouchSensor::new(100)),
            signal: Arc::new(ResetSignal::new()),
            clock: Arc::new(ManualClock::new(0)),
            event_bus: Arc::clone(&event_bus),
            system: Arc::new(ProcessRestart::new(Arc::clone(&event_bus))),
        },
    );

    let cancel = CancellationToken::new();
    tokio::spawn(node.run(cancel.clone()));

    TestNode {
        router: build_router(ServerState::new(handle.clone(), event_bus)),
        handle,
        store,
        cancel,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_data_endpoint_empty_log() {
    let node = start_node();

    let (status, body) = get(&node.router, "/data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_data_endpoint_skips_malformed_lines() {
    let node = start_node();
    node.store
        .insert_raw("data.csv", ["60000,3,3", "60000,three", "120000,5,2"]);

    let (status, body) = get(&node.router, "/data").await;
    assert_eq!(status, StatusCode::OK);

    let points: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        points,
        serde_json::json!([
            {"timestamp": 60000, "touchCount": 3, "touchRate": 3},
            {"timestamp": 120000, "touchCount": 5, "touchRate": 2},
        ])
    );
}

#[tokio::test]
async fn test_reset_endpoint_clears_log() {
    let node = start_node();
    node.store.insert_raw("data.csv", ["60000,3,3"]);

    let (status, body) = get(&node.router, "/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Data has been reset.");
    assert!(!node.store.contains("data.csv"));
    assert_eq!(node.handle.snapshot().resets, 1);

    let request = Request::post("/reset").body(Body::empty()).unwrap();
    let (status, _) = send(&node.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node.handle.snapshot().resets, 2);
}

#[tokio::test]
async fn test_reset_endpoint_without_loop() {
    let node = start_node();
    node.cancel.cancel();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let (status, _) = get(&node.router, "/reset").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_reports_counts() {
    let node = start_node();
    assert_eq!(node.handle.inject_touch().await.unwrap(), Some(1));
    let mut snapshots = node.handle.watch_snapshots();
    snapshots.wait_for(|s| s.lifetime_count == 1).await.unwrap();

    let (status, body) = get(&node.router, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["lifetime_count"], 1);
    assert_eq!(health["last_record"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_dashboard_page() {
    let node = start_node();

    let (status, body) = get(&node.router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("/ws"));
    assert!(body.contains("New_Data:"));
}

//! Health and Metrics Endpoint Tests

use axum::http::StatusCode;
use stock_chat::infrastructure::bus::InMemoryBus;

use crate::common::{unavailable_archive, TestApp};

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_local_connections() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _alice = app.connect("general", "alice");
    let _bob = app.connect("random", "bob");

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["active_connections"], 2);
    assert_eq!(json["channels"], 2);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;

    assert_eq!(app.get("/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_exposes_prometheus_text() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _alice = app.connect("general", "alice");

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("stock_chat_websocket_connections_active"));
}

#[tokio::test]
async fn test_health_through_test_server() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let server = axum_test::TestServer::new(app.router.clone()).unwrap();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["active_connections"], 0);
}

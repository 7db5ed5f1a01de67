//! Real WebSocket connections through `GET /ws/{channel}`: the upgrade, the
//! socket loop and the registry bookkeeping around it.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use chrono::Utc;
use serde_json::Value;
use stock_chat::domain::StoredMessage;
use stock_chat::infrastructure::bus::InMemoryBus;
use stock_chat::presentation::websocket::ChatPayload;

use crate::common::{
    eventually, token_for, unavailable_archive, MemoryMessageRepository, TestApp, TestArchiver,
};

fn serve(app: &TestApp) -> TestServer {
    TestServer::builder()
        .http_transport()
        .build(app.router.clone())
        .unwrap()
}

#[tokio::test]
async fn test_socket_lifecycle_updates_registry() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let server = serve(&app);

    let mut socket = server
        .get_websocket("/ws/general")
        .authorization_bearer(token_for("alice"))
        .await
        .into_websocket()
        .await;
    assert!(eventually(|| app.state().registry.connection_count() == 1).await);

    socket.send_text("hello").await;
    let payload: ChatPayload = socket.receive_json().await;
    assert_eq!(payload.username, "alice");
    assert_eq!(payload.msg, "hello");
    assert!(!payload.is_bot);

    socket.close().await;
    assert!(eventually(|| app.state().registry.connection_count() == 0).await);
}

#[tokio::test]
async fn test_upgrade_without_token_is_rejected() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let server = serve(&app);

    server
        .get_websocket("/ws/general")
        .expect_failure()
        .await
        .assert_status_unauthorized();
    assert_eq!(app.state().registry.connection_count(), 0);
}

#[tokio::test]
async fn test_history_arrives_first_on_the_socket() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    repo.insert(StoredMessage {
        channel: "general".into(),
        user: "bob".into(),
        text: "earlier".into(),
        timestamp: Utc::now() - chrono::Duration::minutes(5),
    });
    let archiver = TestArchiver::spawn(&bus, repo).await;
    let app = TestApp::new(&bus, archiver.client()).await;
    let server = serve(&app);

    let mut socket = server
        .get_websocket("/ws/general")
        .authorization_bearer(token_for("alice"))
        .await
        .into_websocket()
        .await;

    let history: Value = socket.receive_json().await;
    let lines = history.as_array().expect("history is a JSON array");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["Username"], "bob");
    assert_eq!(lines[0]["Msg"], "earlier");

    socket.close().await;
    assert!(eventually(|| app.state().registry.connection_count() == 0).await);
}

#[tokio::test]
async fn test_displaced_connection_leaves_replacement_registered() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let server = serve(&app);

    let _first = server
        .get_websocket("/ws/general")
        .authorization_bearer(token_for("alice"))
        .await
        .into_websocket()
        .await;
    assert!(eventually(|| app.state().registry.connection_count() == 1).await);

    let mut second = server
        .get_websocket("/ws/general")
        .authorization_bearer(token_for("alice"))
        .await
        .into_websocket()
        .await;
    second.send_text("still here").await;
    let payload: ChatPayload = second.receive_json().await;
    assert_eq!(payload.msg, "still here");

    // The displaced socket has been told to close and its loop has ended.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(app.state().registry.connection_count(), 1);

    second.send_text("after").await;
    let payload: ChatPayload = second.receive_json().await;
    assert_eq!(payload.msg, "after");

    second.close().await;
    assert!(eventually(|| app.state().registry.connection_count() == 0).await);
}

//! Creating a channel on one gateway updates every gateway.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use stock_chat::infrastructure::bus::InMemoryBus;
use stock_chat::presentation::websocket::OutboundFrame;

use crate::common::{
    eventually, next_frame, token_for, unavailable_archive, MemoryChannelRepository, TestApp,
};

#[tokio::test]
async fn test_new_channel_reaches_every_gateway() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryChannelRepository::with_channels(&["general"]));
    let first = TestApp::with_repository(&bus, unavailable_archive(), Arc::clone(&repo)).await;
    let second = TestApp::with_repository(&bus, unavailable_archive(), repo).await;

    let mut alice = first.connect("general", "alice");
    let mut bob = second.connect("random", "bob");

    let response = first
        .post_json_auth(
            "/api/channels",
            &json!({ "name": "news" }).to_string(),
            &token_for("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    assert_eq!(next_frame(&mut alice).await, OutboundFrame::ChannelListChanged);
    assert_eq!(next_frame(&mut bob).await, OutboundFrame::ChannelListChanged);

    for app in [&first, &second] {
        let registry = &app.state().registry;
        assert!(eventually(|| registry.has_channel("news")).await);
        assert!(registry.has_channel("general"));
    }
}

#[tokio::test]
async fn test_rejected_channel_is_not_announced() {
    let bus = InMemoryBus::new();
    let app = TestApp::with_channels(&bus, unavailable_archive(), &["general"]).await;
    let mut alice = app.connect("general", "alice");

    let response = app
        .post_json_auth(
            "/api/channels",
            &json!({ "name": "general" }).to_string(),
            &token_for("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    crate::common::assert_no_frame(&mut alice).await;
}

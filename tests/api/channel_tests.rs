//! Channel API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use stock_chat::infrastructure::bus::InMemoryBus;

use crate::common::{token_for, unavailable_archive, TestApp};

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_list_channels() {
    let bus = InMemoryBus::new();
    let app = TestApp::with_channels(&bus, unavailable_archive(), &["random", "general"]).await;

    let response = app.get_auth("/api/channels", &token_for("alice")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "channels": ["general", "random"] })
    );
}

#[tokio::test]
async fn test_create_channel_returns_created() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;

    let response = app
        .post_json_auth(
            "/api/channels",
            &json!({ "name": "news" }).to_string(),
            &token_for("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.get_auth("/api/channels", &token_for("alice")).await;
    assert_eq!(json_body(response).await, json!({ "channels": ["news"] }));
}

#[tokio::test]
async fn test_create_duplicate_channel_conflicts() {
    let bus = InMemoryBus::new();
    let app = TestApp::with_channels(&bus, unavailable_archive(), &["general"]).await;

    let response = app
        .post_json_auth(
            "/api/channels",
            &json!({ "name": "general" }).to_string(),
            &token_for("alice"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_channel_rejects_invalid_names() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let token = token_for("alice");

    for name in ["ab", "with space", "dash-name"] {
        let response = app
            .post_json_auth("/api/channels", &json!({ "name": name }).to_string(), &token)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "name {name:?}");
    }

    let response = app.get_auth("/api/channels", &token).await;
    assert_eq!(json_body(response).await, json!({ "channels": [] }));
}

//! Archive RPC Tests

use std::sync::Arc;

use axum::{body::Body, http::Request, http::StatusCode, Router};
use chrono::{Duration, Utc};
use serde_json::json;
use stock_chat::application::services::ArchiveService;
use stock_chat::domain::{MessageRepository, StoredMessage};
use stock_chat::infrastructure::archive_client::RecentMessagesResponse;
use stock_chat::presentation::http::archiver_router;
use stock_chat::startup::ArchiverState;
use tower::ServiceExt;

use crate::common::MemoryMessageRepository;

fn router_with(repo: Arc<MemoryMessageRepository>) -> Router {
    let repo: Arc<dyn MessageRepository> = repo;
    archiver_router(ArchiverState {
        archive: Arc::new(ArchiveService::new(repo)),
        db: None,
    })
}

fn seed(repo: &MemoryMessageRepository, channel: &str, count: usize) {
    let start = Utc::now() - Duration::minutes(count as i64);
    for i in 0..count {
        repo.insert(StoredMessage {
            channel: channel.to_string(),
            user: "alice".to_string(),
            text: format!("message {i}"),
            timestamp: start + Duration::minutes(i as i64),
        });
    }
}

async fn recent(router: Router, channel: &str, max_messages: usize) -> RecentMessagesResponse {
    let request = Request::builder()
        .method("POST")
        .uri("/rpc/GetRecentMessages")
        .header("Content-Type", "application/json")
        .body(Body::from(
            json!({ "channel": channel, "max_messages": max_messages }).to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_recent_messages_oldest_first() {
    let repo = Arc::new(MemoryMessageRepository::default());
    seed(&repo, "general", 3);
    seed(&repo, "random", 2);

    let response = recent(router_with(repo), "general", 50).await;
    let texts: Vec<_> = response.messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["message 0", "message 1", "message 2"]);
    assert!(response.messages.iter().all(|m| m.channel == "general"));
}

#[tokio::test]
async fn test_limit_is_capped_at_fifty() {
    let repo = Arc::new(MemoryMessageRepository::default());
    seed(&repo, "general", 60);

    let response = recent(router_with(repo), "general", 500).await;
    assert_eq!(response.messages.len(), 50);
    assert_eq!(response.messages[0].text, "message 10");
    assert_eq!(response.messages[49].text, "message 59");
}

#[tokio::test]
async fn test_unknown_channel_is_empty() {
    let repo = Arc::new(MemoryMessageRepository::default());

    let response = recent(router_with(repo), "nowhere", 50).await;
    assert!(response.messages.is_empty());
}

#[tokio::test]
async fn test_archiver_health_without_database() {
    let router = router_with(Arc::new(MemoryMessageRepository::default()));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

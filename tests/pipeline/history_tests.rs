//! History is fetched from the archiver over RPC and sent only to the user
//! who just joined.

use std::sync::Arc;

use chrono::{Duration, Utc};
use stock_chat::domain::StoredMessage;
use stock_chat::infrastructure::bus::InMemoryBus;
use stock_chat::presentation::websocket::{IngressLoop, OutboundFrame};

use crate::common::{
    assert_no_frame, eventually, next_frame, unavailable_archive, MemoryMessageRepository,
    TestApp, TestArchiver,
};

fn history(frame: OutboundFrame) -> Vec<(String, String)> {
    match frame {
        OutboundFrame::History(payloads) => payloads
            .into_iter()
            .map(|p| (p.username, p.msg))
            .collect(),
        other => panic!("expected a history frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_joining_user_alone_receives_history() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    let start = Utc::now() - Duration::minutes(10);
    for (i, text) in ["first", "second"].iter().enumerate() {
        repo.insert(StoredMessage {
            channel: "general".into(),
            user: "bob".into(),
            text: text.to_string(),
            timestamp: start + Duration::minutes(i as i64),
        });
    }
    let archiver = TestArchiver::spawn(&bus, repo).await;
    let app = TestApp::new(&bus, archiver.client()).await;

    let mut bob = app.connect("general", "bob");
    let mut alice = app.connect("general", "alice");
    app.state()
        .history
        .spawn("general".into(), "alice".into())
        .await
        .unwrap();

    assert_eq!(
        history(next_frame(&mut alice).await),
        vec![
            ("bob".to_string(), "first".to_string()),
            ("bob".to_string(), "second".to_string())
        ]
    );
    assert_no_frame(&mut bob).await;
}

#[tokio::test]
async fn test_history_holds_at_most_fifty_latest() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    let start = Utc::now() - Duration::hours(2);
    for i in 0..75 {
        repo.insert(StoredMessage {
            channel: "general".into(),
            user: "bob".into(),
            text: format!("line {i}"),
            timestamp: start + Duration::minutes(i),
        });
    }
    let archiver = TestArchiver::spawn(&bus, repo).await;
    let app = TestApp::new(&bus, archiver.client()).await;

    let mut alice = app.connect("general", "alice");
    let delivered = app.state().history.deliver("general", "alice").await.unwrap();
    assert_eq!(delivered, 50);

    let lines = history(next_frame(&mut alice).await);
    assert_eq!(lines.len(), 50);
    assert_eq!(lines[0].1, "line 25");
    assert_eq!(lines[49].1, "line 74");
}

#[tokio::test]
async fn test_messages_are_archived_then_served_as_history() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    let archiver = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;
    let app = TestApp::new(&bus, archiver.client()).await;

    let mut alice = app.connect("general", "alice");
    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    ingress.on_frame("hello").await;
    assert!(matches!(next_frame(&mut alice).await, OutboundFrame::Chat(_)));
    assert!(eventually(|| repo.stored().len() == 1).await);

    let mut bob = app.connect("general", "bob");
    app.state().history.deliver("general", "bob").await.unwrap();

    assert_eq!(
        history(next_frame(&mut bob).await),
        vec![("alice".to_string(), "hello".to_string())]
    );
}

#[tokio::test]
async fn test_archiver_outage_leaves_connection_usable() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let mut alice = app.connect("general", "alice");

    app.state()
        .history
        .spawn("general".into(), "alice".into())
        .await
        .unwrap();
    assert_no_frame(&mut alice).await;

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    ingress.on_frame("still here").await;
    let OutboundFrame::Chat(payload) = next_frame(&mut alice).await else {
        panic!("expected a chat frame");
    };
    assert_eq!(payload.msg, "still here");
}

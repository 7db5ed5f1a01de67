//! Every chat line is stored once by the archivers sharing `storage-q`,
//! with bounded redelivery when the database is down.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use stock_chat::domain::InboundMessage;
use stock_chat::infrastructure::bus::{BusEvent, InMemoryBus, MessageBus};
use tokio_test::assert_ok;

use crate::common::{eventually, MemoryMessageRepository, TestArchiver};

fn message(text: &str) -> BusEvent {
    BusEvent::UserMessage(InboundMessage::new("alice", "general", text, Utc::now()))
}

#[tokio::test]
async fn test_failed_save_is_redelivered() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::failing_first(2));
    let _archiver = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;

    assert_ok!(bus.publish(&message("hello")).await);

    assert!(eventually(|| repo.stored().len() == 1).await);
    assert_eq!(repo.save_attempts(), 3);
    assert_eq!(repo.stored()[0].text, "hello");
}

#[tokio::test]
async fn test_retries_stop_at_max_deliveries() {
    let bus = InMemoryBus::with_max_deliveries(3);
    let repo = Arc::new(MemoryMessageRepository::failing_first(10));
    let _archiver = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;

    assert_ok!(bus.publish(&message("lost")).await);

    assert!(eventually(|| repo.save_attempts() == 3).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(repo.save_attempts(), 3);
    assert!(repo.stored().is_empty());
}

#[tokio::test]
async fn test_competing_archivers_store_each_message_once() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    let _first = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;
    let _second = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;

    for i in 0..20 {
        assert_ok!(bus.publish(&message(&format!("line {i}"))).await);
    }

    assert!(eventually(|| repo.stored().len() == 20).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(repo.stored().len(), 20);
    assert_eq!(repo.save_attempts(), 20);
}

#[tokio::test]
async fn test_redelivered_line_is_archived_once() {
    let bus = InMemoryBus::new();
    let repo = Arc::new(MemoryMessageRepository::default());
    let _archiver = TestArchiver::spawn(&bus, Arc::clone(&repo)).await;

    let event = message("once");
    assert_ok!(bus.publish(&event).await);
    assert_ok!(bus.publish(&event).await);

    assert!(eventually(|| repo.save_attempts() == 2).await);
    assert_eq!(repo.stored().len(), 1);
}

//! Chat lines travel from one connection's ingress loop through the bus to
//! every connection of the channel, on every gateway.

use std::sync::Arc;

use chrono::Utc;
use stock_chat::domain::{BotResult, InboundMessage};
use stock_chat::infrastructure::bus::{BusEvent, InMemoryBus};
use stock_chat::presentation::websocket::{IngressLoop, OutboundFrame};

use crate::common::{assert_no_frame, next_frame, unavailable_archive, TestApp};

fn chat(frame: OutboundFrame) -> (String, String, bool) {
    match frame {
        OutboundFrame::Chat(payload) => (payload.username, payload.msg, payload.is_bot),
        other => panic!("expected a chat frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_message_reaches_channel_members_only() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let mut alice = app.connect("general", "alice");
    let mut bob = app.connect("general", "bob");
    let mut carol = app.connect("random", "carol");

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    assert_eq!(ingress.on_frame("hello").await, 1);

    assert_eq!(chat(next_frame(&mut alice).await), ("alice".into(), "hello".into(), false));
    assert_eq!(chat(next_frame(&mut bob).await), ("alice".into(), "hello".into(), false));
    assert_no_frame(&mut carol).await;
}

#[tokio::test]
async fn test_message_crosses_gateways() {
    let bus = InMemoryBus::new();
    let first = TestApp::new(&bus, unavailable_archive()).await;
    let second = TestApp::new(&bus, unavailable_archive()).await;
    let mut alice = first.connect("general", "alice");
    let mut bob = second.connect("general", "bob");

    let mut ingress = IngressLoop::new(Arc::clone(&first.state().bus), "general", "alice");
    ingress.on_frame("across").await;

    assert_eq!(chat(next_frame(&mut alice).await).1, "across");
    assert_eq!(chat(next_frame(&mut bob).await).1, "across");
}

#[tokio::test]
async fn test_redelivered_message_is_written_twice() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let mut alice = app.connect("general", "alice");

    let event = BusEvent::UserMessage(InboundMessage::new("bob", "general", "twice", Utc::now()));
    app.state().bus.publish(&event).await.unwrap();
    app.state().bus.publish(&event).await.unwrap();

    assert_eq!(chat(next_frame(&mut alice).await).1, "twice");
    assert_eq!(chat(next_frame(&mut alice).await).1, "twice");
}

#[tokio::test]
async fn test_bot_response_is_broadcast_as_bot() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let mut alice = app.connect("general", "alice");

    let result = BotResult {
        generated_message: "AAPL.US quote is $185.64 per share".into(),
        channel: "general".into(),
        time: Utc::now(),
    };
    app.state()
        .bus
        .publish(&BusEvent::BotResponse(result))
        .await
        .unwrap();

    assert_eq!(
        chat(next_frame(&mut alice).await),
        ("BOT".into(), "AAPL.US quote is $185.64 per share".into(), true)
    );
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let mut first = app.connect("general", "alice");
    let mut second = app.connect("general", "alice");

    assert_eq!(next_frame(&mut first).await, OutboundFrame::Close);

    let event = BusEvent::UserMessage(InboundMessage::new("bob", "general", "hi", Utc::now()));
    app.state().bus.publish(&event).await.unwrap();

    assert_eq!(chat(next_frame(&mut second).await).1, "hi");
    assert_no_frame(&mut first).await;
    assert_eq!(app.state().registry.connection_count(), 1);
}

//! `/stock=<code>` commands go through the bot worker and come back to the
//! channel as bot messages.

use std::sync::Arc;

use stock_chat::infrastructure::bus::{InMemoryBus, MessageBus};
use stock_chat::infrastructure::quote::{HttpQuoteSource, QuoteSource};
use stock_chat::presentation::websocket::{IngressLoop, OutboundFrame};
use stock_chat::startup::BotProcess;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{assert_no_frame, next_frame, test_settings, unavailable_archive, TestApp};

const AAPL_CSV: &str = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                        AAPL.US,2024-01-02,22:00:07,187.15,188.44,183.885,185.64,81964874\n";
const UNKNOWN_CSV: &str = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                           NOPE.US,N/D,N/D,N/D,N/D,N/D,N/D,N/D\n";

async fn start_bot(bus: &InMemoryBus, server: &MockServer) -> BotProcess {
    let mut settings = test_settings();
    settings.quote.base_url = server.uri();
    let quotes: Arc<dyn QuoteSource> = Arc::new(HttpQuoteSource::new(&settings.quote).unwrap());
    let bus: Arc<dyn MessageBus> = Arc::new(bus.clone());
    BotProcess::with_dependencies(bus, quotes).await.unwrap()
}

fn chat_text(frame: OutboundFrame) -> (String, bool) {
    match frame {
        OutboundFrame::Chat(payload) => (payload.msg, payload.is_bot),
        other => panic!("expected a chat frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stock_command_is_answered_in_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/q/l/"))
        .and(query_param("s", "aapl.us"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AAPL_CSV))
        .expect(1)
        .mount(&server)
        .await;

    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _bot = start_bot(&bus, &server).await;
    let mut alice = app.connect("general", "alice");
    let mut bob = app.connect("general", "bob");

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    assert_eq!(ingress.on_frame("/stock=aapl.us").await, 2);

    for rx in [&mut alice, &mut bob] {
        assert_eq!(chat_text(next_frame(rx).await), ("/stock=aapl.us".into(), false));
        assert_eq!(
            chat_text(next_frame(rx).await),
            ("AAPL.US quote is $185.64 per share".into(), true)
        );
    }
}

#[tokio::test]
async fn test_unknown_code_gets_no_answer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/q/l/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(UNKNOWN_CSV))
        .expect(1)
        .mount(&server)
        .await;

    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _bot = start_bot(&bus, &server).await;
    let mut alice = app.connect("general", "alice");

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    ingress.on_frame("/stock=nope.us").await;

    assert_eq!(chat_text(next_frame(&mut alice).await).0, "/stock=nope.us");
    assert_no_frame(&mut alice).await;
}

#[tokio::test]
async fn test_quote_source_outage_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/q/l/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/q/l/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AAPL_CSV))
        .mount(&server)
        .await;

    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _bot = start_bot(&bus, &server).await;
    let mut alice = app.connect("general", "alice");

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    ingress.on_frame("/stock=aapl.us").await;

    assert_eq!(chat_text(next_frame(&mut alice).await).0, "/stock=aapl.us");
    assert_eq!(
        chat_text(next_frame(&mut alice).await),
        ("AAPL.US quote is $185.64 per share".into(), true)
    );
}

#[tokio::test]
async fn test_lookalike_command_never_reaches_bot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(AAPL_CSV))
        .expect(0)
        .mount(&server)
        .await;

    let bus = InMemoryBus::new();
    let app = TestApp::new(&bus, unavailable_archive()).await;
    let _bot = start_bot(&bus, &server).await;
    let mut alice = app.connect("general", "alice");

    let mut ingress = IngressLoop::new(Arc::clone(&app.state().bus), "general", "alice");
    assert_eq!(ingress.on_frame("/stocks=aapl.us").await, 1);

    assert_eq!(chat_text(next_frame(&mut alice).await).0, "/stocks=aapl.us");
    assert_no_frame(&mut alice).await;
}

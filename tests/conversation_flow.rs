//! End-to-end conversation flow: controller + request client + live endpoint

use sgpt_cli::client::{AsyncRequestClient, RequestEvent};
use sgpt_cli::config::Config;
use sgpt_cli::core::conversation::{PLACEHOLDER_TEXT, SERVER_ERROR_PREFIX};
use sgpt_cli::core::traits::NullScene;
use sgpt_cli::core::types::Role;
use sgpt_cli::core::ConversationController;
use sgpt_cli::llm::SimBackend;
use sgpt_cli::retrieval::KeywordIndex;
use sgpt_cli::server::http::{serve, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

async fn start_server() -> String {
    let state = Arc::new(AppState::new(
        Config::default(),
        Arc::new(KeywordIndex::empty()),
        Arc::new(SimBackend::new()),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener, state).await;
    });
    format!("http://{}", addr)
}

fn controller_for(
    base_url: String,
) -> (ConversationController, UnboundedReceiver<RequestEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let client = AsyncRequestClient::new(tx, &Config::default().client);
    let controller = ConversationController::new(Box::new(client), base_url, Arc::new(NullScene));
    (controller, rx)
}

async fn next_event(rx: &mut UnboundedReceiver<RequestEvent>) -> RequestEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no event before timeout")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_success_replaces_placeholder() {
    let base = start_server().await;
    let (mut controller, mut rx) = controller_for(base);

    let rendered = controller.submit("What is 3D Slicer?").unwrap();
    assert!(controller.is_awaiting_response());
    assert!(rendered.contains(PLACEHOLDER_TEXT));
    assert_eq!(controller.dialogue().len(), 2);

    let event = next_event(&mut rx).await;
    assert!(matches!(event, RequestEvent::Success(_)));
    controller.on_event(event).unwrap();

    assert!(!controller.is_awaiting_response());
    assert_eq!(controller.dialogue().len(), 2);
    let answer = &controller.dialogue()[1];
    assert_eq!(answer.role, Role::Assistant);
    assert!(answer.content.contains("What is 3D Slicer?"));
    assert_ne!(answer.content, PLACEHOLDER_TEXT);
}

#[tokio::test]
async fn test_connection_refused_becomes_error_entry() {
    // Bind then drop to obtain a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (mut controller, mut rx) = controller_for(format!("http://127.0.0.1:{}", port));

    controller.submit("hello").unwrap();
    let event = next_event(&mut rx).await;
    let RequestEvent::Failure(ref message) = event else {
        panic!("expected failure event, got {:?}", event);
    };
    assert!(message.starts_with("Request error:"));

    controller.on_event(event).unwrap();
    assert!(!controller.is_awaiting_response());
    assert_eq!(controller.dialogue().len(), 2);
    assert!(controller.dialogue()[1]
        .content
        .starts_with(SERVER_ERROR_PREFIX));
}

#[tokio::test]
async fn test_http_error_status_is_embedded() {
    let base = start_server().await;
    let (mut controller, mut rx) = controller_for(base);

    // use_api without a configured key makes the endpoint answer 401
    controller.set_remote_model(true);
    controller.submit("hello").unwrap();

    let event = next_event(&mut rx).await;
    let RequestEvent::Failure(ref message) = event else {
        panic!("expected failure event, got {:?}", event);
    };
    assert_eq!(message, "HTTP error: 401");

    controller.on_event(event).unwrap();
    assert_eq!(
        controller.dialogue()[1].content,
        format!("{}HTTP error: 401", SERVER_ERROR_PREFIX)
    );
}

#[tokio::test]
async fn test_streaming_chunks_arrive_in_order_then_terminal() {
    let base = start_server().await;
    let (mut controller, mut rx) = controller_for(base);
    controller.set_streaming(true);

    controller.submit("hello world").unwrap();

    let mut chunks = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        match event {
            RequestEvent::Chunk(ref chunk) => {
                assert!(!chunk.contains("[[DONE]]"));
                chunks.push(chunk.clone());
                controller.on_event(event).unwrap();
                assert!(controller.is_awaiting_response());
            }
            RequestEvent::StreamDone => {
                controller.on_event(event).unwrap();
                break;
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert!(!chunks.is_empty());
    assert!(!controller.is_awaiting_response());
    // Accumulated entry equals the concatenation of the chunks, in order
    assert_eq!(controller.dialogue()[1].content, chunks.concat());
    assert!(controller.dialogue()[1].content.contains("hello world"));

    // No events after the terminal one
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_gate_allows_resubmit_after_terminal() {
    let base = start_server().await;
    let (mut controller, mut rx) = controller_for(base);

    controller.submit("first").unwrap();
    assert!(controller.submit("second").is_none());

    let event = next_event(&mut rx).await;
    controller.on_event(event).unwrap();

    assert!(controller.submit("third").is_some());
    let event = next_event(&mut rx).await;
    controller.on_event(event).unwrap();
    assert_eq!(controller.dialogue().len(), 4);
}

//! Contract tests for the inference HTTP endpoint, backed by the sim backend

use serde_json::{json, Value};
use sgpt_cli::config::Config;
use sgpt_cli::llm::SimBackend;
use sgpt_cli::retrieval::{Document, KeywordIndex};
use sgpt_cli::server::http::{serve, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

async fn start_server() -> (String, JoinHandle<()>) {
    let index = Arc::new(KeywordIndex::new(vec![Document {
        content: "3D Slicer is an open-source medical imaging platform.".to_string(),
        source: None,
    }]));
    let state = Arc::new(AppState::new(
        Config::default(),
        index,
        Arc::new(SimBackend::new()),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });

    (format!("http://{}", addr), handle)
}

fn generate_body(content: &str, think: bool, use_api: bool) -> Value {
    json!({
        "role": "user",
        "content": content,
        "think": think,
        "use_api": use_api,
    })
}

#[tokio::test]
async fn test_health_answers_ok_with_timestamp() {
    let (base, _server) = start_server().await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_generate_returns_content_grounded_on_question() {
    let (base, _server) = start_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&generate_body("What is 3D Slicer?", false, false))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let body: Value = response.json().await.unwrap();
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("What is 3D Slicer?"));
    assert!(content.contains("/no_think"));
}

#[tokio::test]
async fn test_request_think_flag_reaches_the_prompt() {
    let (base, _server) = start_server().await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&generate_body("hello", true, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(body["content"].as_str().unwrap().ends_with("/think"));
}

#[tokio::test]
async fn test_set_think_default_applies_to_later_requests() {
    let (base, _server) = start_server().await;
    let client = reqwest::Client::new();

    let ack: Value = client
        .post(format!("{}/setThink", base))
        .json(&json!({ "think": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ack["status"], "ok");

    // The request itself says think=false; the server default wins
    let body: Value = client
        .post(format!("{}/generate", base))
        .json(&generate_body("hello", false, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["content"].as_str().unwrap().ends_with("/think"));
}

#[tokio::test]
async fn test_use_api_without_key_is_unauthorized() {
    let (base, _server) = start_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .json(&generate_body("hello", false, true))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("addKey"));
}

#[tokio::test]
async fn test_add_key_acknowledges() {
    let (base, _server) = start_server().await;

    let ack: Value = reqwest::Client::new()
        .post(format!("{}/addKey", base))
        .json(&json!({ "key": "sk-test" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(ack["status"], "ok");
}

#[tokio::test]
async fn test_generate_stream_body_has_no_sentinel() {
    let (base, _server) = start_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/generateStream", base))
        .json(&generate_body("What is 3D Slicer?", false, false))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(!body.contains("[[DONE]]"));
    assert!(body.contains("What is 3D Slicer?"));
}

#[tokio::test]
async fn test_stream_and_one_shot_agree_on_content() {
    let (base, _server) = start_server().await;
    let client = reqwest::Client::new();

    let one_shot: Value = client
        .post(format!("{}/generate", base))
        .json(&generate_body("hello", false, false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let streamed = client
        .post(format!("{}/generateStream", base))
        .json(&generate_body("hello", false, false))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(one_shot["content"].as_str().unwrap(), streamed);
}

#[tokio::test]
async fn test_malformed_request_is_client_error() {
    let (base, _server) = start_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/generate", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_shutdown_flushes_response_then_stops() {
    let (base, server) = start_server().await;

    let body: Value = reqwest::get(format!("{}/shutdown", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "shutting_down");

    // The server task ends shortly after the response was flushed
    tokio::time::timeout(Duration::from_secs(3), server)
        .await
        .expect("server did not stop after /shutdown")
        .unwrap();
}

//! E2E tests for the Gateway HTTP API

use std::sync::Arc;

use parley_context::BudgetPolicy;
use parley_gateway::{app, AppState, ChatOrchestrator};
use parley_protocol::{ChatRequest, ChatResponse, ErrorBody, Message, ModelInfo};
use parley_runtime::{MockProvider, ModelDescriptor};
use tokio::net::TcpListener;

async fn spawn_gateway_server(
    provider: Arc<MockProvider>,
) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let state = AppState::new(ChatOrchestrator::new(provider, BudgetPolicy::default()));
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app(state))
            .await
            .expect("serve gateway app");
    });

    (addr, handle)
}

fn mock_provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::new().with_models(vec![ModelDescriptor::new(
        "mock-1", "Mock One", "mock", "parley", 1_000,
    )]))
}

#[tokio::test]
#[ignore = "starts network listeners"]
async fn gateway_health_check() {
    let (addr, server_handle) = spawn_gateway_server(mock_provider()).await;

    let response = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("health check request");

    assert!(response.status().is_success());
    server_handle.abort();
}

#[tokio::test]
#[ignore = "starts network listeners"]
async fn gateway_multi_turn_conversation() {
    let provider = mock_provider();
    provider.enqueue_text(&["Hi Alice."]);
    provider.enqueue_text(&["Your name is Alice."]);
    let (addr, server_handle) = spawn_gateway_server(provider.clone()).await;
    let http = reqwest::Client::new();

    let models: Vec<ModelInfo> = http
        .get(format!("http://{}/models", addr))
        .send()
        .await
        .expect("models request")
        .json()
        .await
        .expect("decode models");
    assert_eq!(models[0].id, "mock-1");

    let mut conversation = vec![Message::user("My name is Alice.")];
    let first: ChatResponse = http
        .post(format!("http://{}/chat", addr))
        .json(&ChatRequest::new("mock-1", conversation.clone()))
        .send()
        .await
        .expect("first chat request")
        .json()
        .await
        .expect("decode first reply");
    assert_eq!(first.content, "Hi Alice.");

    conversation.push(Message::assistant(first.content));
    conversation.push(Message::user("What is my name?"));
    let second: ChatResponse = http
        .post(format!("http://{}/chat", addr))
        .json(&ChatRequest::new("mock", conversation))
        .send()
        .await
        .expect("second chat request")
        .json()
        .await
        .expect("decode second reply");

    assert_eq!(second.content, "Your name is Alice.");
    assert_eq!(provider.complete_calls()[1].len(), 3);
    server_handle.abort();
}

#[tokio::test]
#[ignore = "starts network listeners"]
async fn gateway_rejects_malformed_body() {
    let provider = mock_provider();
    let (addr, server_handle) = spawn_gateway_server(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/chat", addr))
        .header("content-type", "application/json")
        .body(r#"{"model":"mock-1","messages":"hi"}"#)
        .send()
        .await
        .expect("chat request");

    assert_eq!(response.status().as_u16(), 400);
    let body: ErrorBody = response.json().await.expect("decode error body");
    assert_eq!(
        body.error,
        "Invalid request. Required: model (string), messages (array)"
    );
    assert_eq!(provider.complete_call_count(), 0);
    server_handle.abort();
}

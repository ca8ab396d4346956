//! OpenAI-compatible chat completions backend
//!
//! Talks to any server exposing `/v1/models` and a streaming
//! `/v1/chat/completions` endpoint. Token counts are estimated locally.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::tokens::estimate_tokens;
use crate::{
    ModelDescriptor, ModelProvider, NativeMessage, ProviderError, ProviderStream, StreamChunk,
    TokenInput,
};

const OPENAI_CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
const OPENAI_MODELS_PATH: &str = "/v1/models";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 128_000;

#[derive(Debug, Clone)]
pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    models: Vec<ModelDescriptor>,
    default_max_input_tokens: usize,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            api_key: None,
            base_url: base_url.into(),
            models: Vec::new(),
            default_max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Serve a fixed model list instead of querying `/v1/models`.
    pub fn with_models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.models = models;
        self
    }

    /// Budget assigned to models discovered through `/v1/models`.
    pub fn with_default_max_input_tokens(mut self, max_input_tokens: usize) -> Self {
        self.default_max_input_tokens = max_input_tokens;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn payload(model: &ModelDescriptor, messages: &[NativeMessage]) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.id.clone(),
            messages: messages
                .iter()
                .map(|message| ChatMessage {
                    role: message.channel.as_str().to_string(),
                    content: message.content.clone(),
                })
                .collect(),
            stream: true,
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        let response = self
            .authorize(self.client.get(self.endpoint(OPENAI_MODELS_PATH)))
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            return Err(classify_status(status.as_u16(), &body));
        }

        let listing: ModelListResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        Ok(listing
            .data
            .into_iter()
            .map(|entry| {
                ModelDescriptor::new(
                    entry.id.clone(),
                    entry.id.clone(),
                    entry.id,
                    entry.owned_by.unwrap_or_else(|| "unknown".to_string()),
                    self.default_max_input_tokens,
                )
            })
            .collect())
    }
}

/// Map a non-success HTTP status to a classified provider error.
pub(crate) fn classify_status(status: u16, body: &str) -> ProviderError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let message = detail
        .as_ref()
        .map(|detail| detail.message.clone())
        .unwrap_or_else(|| body.to_string());
    let content_filtered = detail.as_ref().is_some_and(|detail| {
        detail.code.as_deref() == Some("content_filter")
            || detail.kind.as_deref() == Some("content_filter")
    });

    match status {
        401 | 403 => ProviderError::NoPermissions(message),
        404 => ProviderError::NotFound(message),
        400 if content_filtered => ProviderError::Blocked(message),
        _ => ProviderError::HttpStatus {
            status,
            body: message,
        },
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatibleProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        if !self.models.is_empty() {
            return Ok(self.models.clone());
        }
        self.fetch_models().await
    }

    async fn count_tokens(
        &self,
        _model: &ModelDescriptor,
        input: TokenInput<'_>,
    ) -> Result<usize, ProviderError> {
        Ok(estimate_tokens(input.text()))
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[NativeMessage],
    ) -> Result<ProviderStream, ProviderError> {
        let payload = Self::payload(model, messages);
        let request = self.authorize(
            self.client
                .post(self.endpoint(OPENAI_CHAT_COMPLETIONS_PATH))
                .json(&payload),
        );

        let mut event_source = request
            .eventsource()
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        debug!(model = %model.id, messages = messages.len(), "Opened completion stream");

        let (tx, rx) = mpsc::channel::<Result<StreamChunk, ProviderError>>(32);
        tokio::spawn(async move {
            let mut finished = false;

            while let Some(event) = event_source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            break;
                        }

                        let chunk = match serde_json::from_str::<ChatCompletionChunk>(&message.data)
                        {
                            Ok(chunk) => chunk,
                            Err(err) => {
                                let _ = tx.send(Err(ProviderError::Decode(err.to_string()))).await;
                                finished = true;
                                break;
                            }
                        };

                        let Some(choice) = chunk.choices.into_iter().next() else {
                            continue;
                        };

                        if let Some(text) = choice.delta.content {
                            if !text.is_empty() && tx.send(Ok(StreamChunk::Delta { text })).await.is_err() {
                                finished = true;
                                break;
                            }
                        }

                        match choice.finish_reason.as_deref() {
                            Some("content_filter") => {
                                let _ = tx
                                    .send(Err(ProviderError::Blocked(
                                        "completion stopped by content filter".to_string(),
                                    )))
                                    .await;
                                finished = true;
                                break;
                            }
                            Some(_) => break,
                            None => {}
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "<unable to read body>".to_string());
                        warn!(status = status.as_u16(), "Completion request rejected");
                        let _ = tx.send(Err(classify_status(status.as_u16(), &body))).await;
                        finished = true;
                        break;
                    }
                    Err(err) => {
                        let _ = tx.send(Err(ProviderError::Transport(err.to_string()))).await;
                        finished = true;
                        break;
                    }
                }
            }

            event_source.close();
            if !finished {
                let _ = tx.send(Ok(StreamChunk::Done)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{classify_status, OpenAICompatibleProvider};
    use crate::{ModelDescriptor, ModelProvider, NativeMessage, ProviderError, StreamChunk};
    use futures::StreamExt;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    fn network_tests_enabled() -> bool {
        matches!(std::env::var("PARLEY_RUN_NETWORK_TESTS"), Ok(value) if value == "1")
    }

    fn model() -> ModelDescriptor {
        ModelDescriptor::new("gpt-4o-mini", "GPT-4o mini", "gpt-4o-mini", "openai", 128_000)
    }

    #[test]
    fn endpoint_building_trims_trailing_slash() {
        let provider = OpenAICompatibleProvider::new("http://localhost:11434/").unwrap();
        assert_eq!(
            provider.endpoint("/v1/chat/completions"),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn payload_maps_channels_to_roles() {
        let payload = OpenAICompatibleProvider::payload(
            &model(),
            &[NativeMessage::user("hi"), NativeMessage::assistant("hello")],
        );

        let encoded = serde_json::to_value(&payload).unwrap();
        assert_eq!(encoded["model"], "gpt-4o-mini");
        assert_eq!(encoded["stream"], true);
        assert_eq!(encoded["messages"][0]["role"], "user");
        assert_eq!(encoded["messages"][1]["role"], "assistant");
        assert_eq!(encoded["messages"][1]["content"], "hello");
    }

    #[test]
    fn classifies_permission_and_policy_failures() {
        let auth = classify_status(401, r#"{"error":{"message":"bad key","type":"invalid_request_error"}}"#);
        assert_eq!(auth, ProviderError::NoPermissions("bad key".to_string()));

        let blocked = classify_status(
            400,
            r#"{"error":{"message":"filtered","code":"content_filter"}}"#,
        );
        assert_eq!(blocked, ProviderError::Blocked("filtered".to_string()));

        let missing = classify_status(404, "no such model");
        assert_eq!(missing, ProviderError::NotFound("no such model".to_string()));

        let limited = classify_status(429, r#"{"error":{"message":"Rate limit exceeded"}}"#);
        assert_eq!(
            limited,
            ProviderError::HttpStatus {
                status: 429,
                body: "Rate limit exceeded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn configured_models_skip_discovery() {
        let provider = OpenAICompatibleProvider::new("http://127.0.0.1:9")
            .unwrap()
            .with_models(vec![model()]);

        assert_eq!(provider.list_models().await.unwrap(), vec![model()]);
    }

    #[tokio::test]
    async fn list_models_maps_discovered_entries() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/models");
                then.status(200).json_body(json!({
                    "object": "list",
                    "data": [{"id": "llama3", "object": "model", "owned_by": "library"}]
                }));
            })
            .await;

        let provider = OpenAICompatibleProvider::new(server.base_url())
            .unwrap()
            .with_default_max_input_tokens(8_192);
        let models = provider.list_models().await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            models,
            vec![ModelDescriptor::new("llama3", "llama3", "llama3", "library", 8_192)]
        );
    }

    #[tokio::test]
    async fn complete_reads_sse_and_emits_delta_chunks() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        let sse = concat!(
            "data: {\"id\":\"c-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"id\":\"c-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"id\":\"c-1\",\"object\":\"chat.completion.chunk\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n"
        );

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .body_includes("\"stream\":true");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(sse);
            })
            .await;

        let provider = OpenAICompatibleProvider::new(server.base_url())
            .unwrap()
            .with_api_key("test-key");
        let mut stream = provider
            .complete(&model(), &[NativeMessage::user("Say hello")])
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        let done = stream.next().await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(first, StreamChunk::Delta { text: "Hel".to_string() });
        assert_eq!(second, StreamChunk::Delta { text: "lo".to_string() });
        assert_eq!(done, StreamChunk::Done);
    }

    #[tokio::test]
    async fn complete_maps_forbidden_status_to_no_permissions() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(403).json_body(json!({
                    "error": {"message": "model access denied", "type": "permission_error"}
                }));
            })
            .await;

        let provider = OpenAICompatibleProvider::new(server.base_url()).unwrap();
        let mut stream = provider
            .complete(&model(), &[NativeMessage::user("hi")])
            .await
            .unwrap();

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(
            err,
            ProviderError::NoPermissions("model access denied".to_string())
        );
    }
}

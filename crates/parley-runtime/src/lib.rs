//! Runtime abstractions for model capability providers.
//!
//! A provider enumerates models, counts tokens for a model, and streams
//! completions. The gateway core only ever talks to the [`ModelProvider`]
//! trait; concrete backends live in [`providers`].

pub mod providers;
pub mod tokens;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use providers::OpenAICompatibleProvider;
pub use tokens::estimate_tokens;

/// Read-only description of a model, owned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub family: String,
    pub vendor: String,
    pub max_input_tokens: usize,
}

impl ModelDescriptor {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        family: impl Into<String>,
        vendor: impl Into<String>,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            family: family.into(),
            vendor: vendor.into(),
            max_input_tokens,
        }
    }
}

/// Native message channel. There is no separate system channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    User,
    Assistant,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::User => "user",
            Channel::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeMessage {
    pub channel: Channel,
    pub content: String,
}

impl NativeMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            channel: Channel::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            channel: Channel::Assistant,
            content: content.into(),
        }
    }
}

/// What a token count is requested for.
#[derive(Debug, Clone, Copy)]
pub enum TokenInput<'a> {
    Message(&'a NativeMessage),
    Text(&'a str),
}

impl<'a> TokenInput<'a> {
    pub fn text(&self) -> &'a str {
        match *self {
            TokenInput::Message(message) => &message.content,
            TokenInput::Text(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunk {
    Delta { text: String },
    Done,
}

pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Classified backend failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("mock provider has no queued response")]
    MockQueueEmpty,
    #[error("no permission to use the model: {0}")]
    NoPermissions(String),
    #[error("request blocked by content policy: {0}")]
    Blocked(String),
    #[error("model not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("provider error: {0}")]
    Message(String),
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError>;

    async fn count_tokens(
        &self,
        model: &ModelDescriptor,
        input: TokenInput<'_>,
    ) -> Result<usize, ProviderError>;

    /// Start a completion. The returned stream is finite and ends after
    /// [`StreamChunk::Done`] or the first error.
    async fn complete(
        &self,
        model: &ModelDescriptor,
        messages: &[NativeMessage],
    ) -> Result<ProviderStream, ProviderError>;
}

/// Drain a completion stream, concatenating fragments in arrival order.
///
/// Stops at [`StreamChunk::Done`]; the first error aborts collection.
pub async fn collect_text(mut stream: ProviderStream) -> Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            StreamChunk::Delta { text: fragment } => text.push_str(&fragment),
            StreamChunk::Done => break,
        }
    }
    Ok(text)
}

type QueuedStream = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

/// Queue-driven provider for tests. Token counts use [`estimate_tokens`].
#[derive(Debug, Default)]
pub struct MockProvider {
    models: Vec<ModelDescriptor>,
    list_error: Option<ProviderError>,
    count_error: Option<ProviderError>,
    stream_queue: Mutex<VecDeque<QueuedStream>>,
    complete_calls: Mutex<Vec<Vec<NativeMessage>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_models(mut self, models: Vec<ModelDescriptor>) -> Self {
        self.models = models;
        self
    }

    pub fn with_list_error(mut self, error: ProviderError) -> Self {
        self.list_error = Some(error);
        self
    }

    pub fn with_count_error(mut self, error: ProviderError) -> Self {
        self.count_error = Some(error);
        self
    }

    pub fn enqueue_stream(&self, result: Result<Vec<StreamChunk>, ProviderError>) {
        self.stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .push_back(result.map(|chunks| chunks.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that yields `chunks` and then fails with `error`.
    pub fn enqueue_stream_then_error(&self, chunks: Vec<StreamChunk>, error: ProviderError) {
        let mut items: Vec<Result<StreamChunk, ProviderError>> =
            chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .push_back(Ok(items));
    }

    /// Convenience for a successful completion made of text fragments.
    pub fn enqueue_text(&self, fragments: &[&str]) {
        let mut chunks: Vec<StreamChunk> = fragments
            .iter()
            .map(|text| StreamChunk::Delta {
                text: (*text).to_string(),
            })
            .collect();
        chunks.push(StreamChunk::Done);
        self.enqueue_stream(Ok(chunks));
    }

    /// Message lists passed to `complete`, in call order.
    pub fn complete_calls(&self) -> Vec<Vec<NativeMessage>> {
        self.complete_calls
            .lock()
            .expect("mock call log poisoned")
            .clone()
    }

    pub fn complete_call_count(&self) -> usize {
        self.complete_calls
            .lock()
            .expect("mock call log poisoned")
            .len()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, ProviderError> {
        match &self.list_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.models.clone()),
        }
    }

    async fn count_tokens(
        &self,
        _model: &ModelDescriptor,
        input: TokenInput<'_>,
    ) -> Result<usize, ProviderError> {
        match &self.count_error {
            Some(err) => Err(err.clone()),
            None => Ok(estimate_tokens(input.text())),
        }
    }

    async fn complete(
        &self,
        _model: &ModelDescriptor,
        messages: &[NativeMessage],
    ) -> Result<ProviderStream, ProviderError> {
        self.complete_calls
            .lock()
            .expect("mock call log poisoned")
            .push(messages.to_vec());

        let next = self
            .stream_queue
            .lock()
            .expect("mock stream queue poisoned")
            .pop_front()
            .unwrap_or(Err(ProviderError::MockQueueEmpty))?;

        Ok(Box::pin(stream::iter(next)))
    }
}

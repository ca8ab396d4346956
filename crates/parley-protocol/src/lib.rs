//! Parley wire contract.
//!
//! This crate implements:
//! - the chat turn envelope (`ChatRequest` in, `ChatResponse` or `ErrorBody` out)
//! - request shape validation shared by the gateway and its clients
//! - the read-only model listing (`ModelInfo`) and health payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error text returned when `model` or `messages` is missing or has the wrong shape.
pub const INVALID_REQUEST_MESSAGE: &str =
    "Invalid request. Required: model (string), messages (array)";

/// Error text returned when the body is not JSON at all.
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged entry of a conversation. Position is its only identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{}", INVALID_JSON_MESSAGE)]
    InvalidJson,
    #[error("{}", INVALID_REQUEST_MESSAGE)]
    MissingFields,
    /// Shares the shape-error text; `index` and `reason` are for logs.
    #[error("{}", INVALID_REQUEST_MESSAGE)]
    InvalidMessage { index: usize, reason: String },
}

/// Body of `POST /chat`. The caller resends the whole conversation every turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
        }
    }

    /// Parse and validate a raw request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::InvalidJson)?;
        Self::from_value(&value)
    }

    /// Validate an already-decoded JSON document.
    ///
    /// An empty `messages` array is accepted; an empty `model` string is not.
    pub fn from_value(value: &Value) -> Result<Self, RequestError> {
        let model = value
            .get("model")
            .and_then(Value::as_str)
            .filter(|model| !model.is_empty());
        let messages = value.get("messages").and_then(Value::as_array);

        let (Some(model), Some(messages)) = (model, messages) else {
            return Err(RequestError::MissingFields);
        };

        let messages = messages
            .iter()
            .enumerate()
            .map(|(index, item)| {
                Message::deserialize(item).map_err(|err| RequestError::InvalidMessage {
                    index,
                    reason: err.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(model, messages))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

/// Every error response carries exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub family: String,
    pub vendor: String,
    pub max_input_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

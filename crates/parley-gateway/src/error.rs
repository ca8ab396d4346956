//! Chat error taxonomy and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parley_context::ContextError;
use parley_protocol::{ErrorBody, RequestError};
use parley_runtime::ProviderError;

/// Classified failure of a chat turn.
///
/// The `Display` text is what the caller sees in the `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Content blocked: {0}")]
    ContentBlocked(String),

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ChatError::ContentBlocked(_)
            | ChatError::CompletionFailed(_)
            | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label for logs and metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ChatError::InvalidRequest(_) => "invalid_request",
            ChatError::ModelNotFound(_) => "model_not_found",
            ChatError::PermissionDenied(_) => "permission_denied",
            ChatError::ContentBlocked(_) => "content_blocked",
            ChatError::CompletionFailed(_) => "completion_failed",
            ChatError::Internal(_) => "internal",
        }
    }
}

impl From<RequestError> for ChatError {
    fn from(err: RequestError) -> Self {
        ChatError::InvalidRequest(err.to_string())
    }
}

impl From<ProviderError> for ChatError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoPermissions(message) => ChatError::PermissionDenied(message),
            ProviderError::Blocked(message) => ChatError::ContentBlocked(message),
            other => ChatError::CompletionFailed(other.to_string()),
        }
    }
}

impl From<ContextError> for ChatError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::TokenCountError(provider) => provider.into(),
            ContextError::InvalidPolicy(message) => ChatError::Internal(message),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

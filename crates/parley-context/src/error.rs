//! Error types for context management

use parley_runtime::ProviderError;
use thiserror::Error;

/// Context management error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Token counting error: {0}")]
    TokenCountError(ProviderError),

    #[error("Invalid budget policy: {0}")]
    InvalidPolicy(String),
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

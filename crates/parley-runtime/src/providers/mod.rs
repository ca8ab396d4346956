//! Model provider implementations
//!
//! Concrete implementations of the ModelProvider trait for real backends.

pub mod openai;

pub use openai::OpenAICompatibleProvider;

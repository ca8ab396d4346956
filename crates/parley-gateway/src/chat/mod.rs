//! Chat turn orchestration
//!
//! Drives one request/response cycle: resolve the model, adapt the
//! conversation, apply the context budget, complete, and report usage.

pub mod service;

pub use service::{model_info, resolve_model, ChatOrchestrator, ChatTurnResult};

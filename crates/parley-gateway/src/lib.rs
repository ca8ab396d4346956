//! Parley Gateway
//!
//! This crate implements the HTTP surface for Parley:
//! - chat turn orchestration over an injected model provider
//! - error classification into HTTP status codes
//! - configuration, routing, and Prometheus metrics

pub mod chat;
pub mod config;
pub mod error;
pub mod metrics;
pub mod router;

pub use chat::{ChatOrchestrator, ChatTurnResult};
pub use config::{ConfigError, GatewayConfig};
pub use error::ChatError;
pub use router::{app, build_routes, AppState};

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

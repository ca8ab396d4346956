//! Prometheus metrics for Parley Gateway
//!
//! Exposes metrics for monitoring chat turns, budget decisions, and token usage.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, CounterVec, GaugeVec, Histogram,
};

lazy_static! {
    // ============================================================================
    // Chat Turn Metrics
    // ============================================================================

    /// Chat turns started, by resolved model
    pub static ref CHAT_TURNS_TOTAL: CounterVec =
        register_counter_vec!("parley_chat_turns_total", "Total chat turns by model", &["model"])
            .expect("register parley_chat_turns_total");

    /// Chat turn failures by error class
    pub static ref CHAT_ERRORS: CounterVec =
        register_counter_vec!("parley_chat_errors_total", "Chat turn errors by type", &["error_type"])
            .expect("register parley_chat_errors_total");

    /// End-to-end chat turn latency
    pub static ref CHAT_LATENCY: Histogram = register_histogram!(
        "parley_chat_latency_seconds",
        "Chat turn latency in seconds",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("register parley_chat_latency_seconds");

    // ============================================================================
    // Context Budget Metrics
    // ============================================================================

    /// Tokens reported to callers
    pub static ref TOKENS_TOTAL: CounterVec =
        register_counter_vec!("parley_tokens_total", "Total tokens by direction", &["type"])
            .expect("register parley_tokens_total");

    /// Budget manager decisions
    pub static ref BUDGET_ACTIONS: CounterVec =
        register_counter_vec!("parley_budget_actions_total", "Context budget actions", &["action"])
            .expect("register parley_budget_actions_total");

    // ============================================================================
    // System Metrics
    // ============================================================================

    /// Build info
    pub static ref BUILD_INFO: GaugeVec =
        register_gauge_vec!("parley_build_info", "Build information", &["version", "commit"])
            .expect("register parley_build_info");
}

/// Initialize metrics with build info
pub fn init_metrics() {
    BUILD_INFO
        .with_label_values(&[
            env!("CARGO_PKG_VERSION"),
            option_env!("GIT_COMMIT_SHA").unwrap_or("unknown"),
        ])
        .set(1.0);
}

/// Export metrics in Prometheus text format
pub fn export() -> prometheus::Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
}

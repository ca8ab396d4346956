//! Parley Gateway - HTTP entry point

use clap::Parser;
use parley_gateway::{app, AppState, ChatOrchestrator, GatewayConfig, GATEWAY_VERSION};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "parley_gateway=debug,parley_context=debug,parley_runtime=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = GatewayConfig::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Parley Gateway v{}", GATEWAY_VERSION);
    parley_gateway::metrics::init_metrics();

    let provider = config.build_provider()?;
    let policy = config.budget_policy()?;
    tracing::info!(
        provider = provider.name(),
        backend = %config.backend_url,
        threshold = policy.threshold_ratio,
        "Provider configured"
    );

    let state = AppState::new(ChatOrchestrator::new(provider, policy))
        .with_max_body_bytes(config.max_body_bytes);
    let app = app(state);

    tracing::info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}

//! Gateway configuration from flags and environment

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use parley_context::{BudgetPolicy, ContextError};
use parley_runtime::providers::openai::{DEFAULT_MAX_INPUT_TOKENS, DEFAULT_OPENAI_BASE_URL};
use parley_runtime::{ModelDescriptor, ModelProvider, OpenAICompatibleProvider, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read models file {}: {message}", path.display())]
    ModelsFileRead { path: PathBuf, message: String },
    #[error("invalid models file {}: {message}", path.display())]
    ModelsFileParse { path: PathBuf, message: String },
    #[error("invalid budget policy: {0}")]
    Budget(#[from] ContextError),
    #[error("failed to build provider: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "parley-gateway",
    version,
    about = "Parley chat gateway",
    long_about = "HTTP gateway that runs chat turns against an OpenAI-compatible backend, keeping each conversation inside the model's input-token budget"
)]
pub struct GatewayConfig {
    #[arg(
        long,
        env = "PARLEY_BIND_ADDR",
        default_value = "127.0.0.1:3434",
        help = "Address to listen on"
    )]
    pub bind: SocketAddr,

    #[arg(
        long,
        env = "PARLEY_BACKEND_URL",
        default_value = DEFAULT_OPENAI_BASE_URL,
        help = "Base URL of the OpenAI-compatible backend"
    )]
    pub backend_url: String,

    #[arg(long, env = "PARLEY_API_KEY", hide_env_values = true, help = "Backend API key")]
    pub api_key: Option<String>,

    #[arg(
        long,
        env = "PARLEY_MODELS_FILE",
        help = "JSON file listing model descriptors; queried from the backend when absent"
    )]
    pub models_file: Option<PathBuf>,

    #[arg(
        long,
        env = "PARLEY_DEFAULT_MAX_INPUT_TOKENS",
        default_value_t = DEFAULT_MAX_INPUT_TOKENS,
        help = "Input-token budget for backend models without a configured limit"
    )]
    pub default_max_input_tokens: usize,

    #[arg(
        long,
        env = "PARLEY_SUMMARY_THRESHOLD",
        default_value_t = parley_context::window::DEFAULT_THRESHOLD_RATIO,
        help = "Fraction of the budget above which history is summarized"
    )]
    pub summary_threshold: f64,

    #[arg(
        long,
        env = "PARLEY_MAX_BODY_BYTES",
        default_value_t = crate::router::DEFAULT_MAX_BODY_BYTES,
        help = "Largest accepted request body in bytes"
    )]
    pub max_body_bytes: usize,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl GatewayConfig {
    pub fn budget_policy(&self) -> Result<BudgetPolicy, ConfigError> {
        Ok(BudgetPolicy::new(self.summary_threshold)?)
    }

    /// Models from `--models-file`, or `None` to query the backend.
    pub fn load_models(&self) -> Result<Option<Vec<ModelDescriptor>>, ConfigError> {
        self.models_file.as_deref().map(read_models_file).transpose()
    }

    pub fn build_provider(&self) -> Result<Arc<dyn ModelProvider>, ConfigError> {
        let mut provider = OpenAICompatibleProvider::new(&self.backend_url)?
            .with_default_max_input_tokens(self.default_max_input_tokens);
        if let Some(api_key) = &self.api_key {
            provider = provider.with_api_key(api_key);
        }
        if let Some(models) = self.load_models()? {
            provider = provider.with_models(models);
        }
        Ok(Arc::new(provider))
    }
}

fn read_models_file(path: &Path) -> Result<Vec<ModelDescriptor>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::ModelsFileRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|err| ConfigError::ModelsFileParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

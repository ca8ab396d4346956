use std::time::Duration;

use clap::{Parser, Subcommand};
use parley_protocol::{ChatRequest, ChatResponse, ErrorBody, HealthResponse, Message, ModelInfo};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:3434";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Parser)]
#[command(
    name = "parley",
    version,
    about = "Parley command line client",
    long_about = "Parley command line client for listing models and chatting through a Parley gateway"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "PARLEY_SERVER",
        default_value = DEFAULT_SERVER,
        help = "Gateway base HTTP URL"
    )]
    pub server: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Check gateway health")]
    Health,
    #[command(about = "List models offered by the gateway")]
    Models,
    #[command(about = "Send a single message and print the reply")]
    Chat {
        #[arg(help = "Model id or family")]
        model: String,
        #[arg(help = "Message text")]
        message: String,
        #[arg(long, help = "Optional system instruction sent before the message")]
        system: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("http transport error: {0}")]
    HttpTransport(String),
    #[error("gateway error ({status}): {error}")]
    Gateway { status: u16, error: String },
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("json decode error: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct CliClient {
    base_url: String,
    http: reqwest::Client,
}

impl CliClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn health(&self) -> Result<HealthResponse, CliError> {
        self.get_json("/health").await
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>, CliError> {
        self.get_json("/models").await
    }

    /// Send the whole conversation; the gateway keeps no history.
    pub async fn chat(&self, model: &str, messages: &[Message]) -> Result<ChatResponse, CliError> {
        if model.trim().is_empty() {
            return Err(CliError::InvalidArgument(
                "model cannot be empty".to_string(),
            ));
        }
        let payload = ChatRequest::new(model, messages.to_vec());
        self.post_json("/chat", &payload).await
    }

    async fn post_json<TReq, TRes>(&self, path: &str, payload: &TReq) -> Result<TRes, CliError>
    where
        TReq: Serialize + Sync,
        TRes: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(payload)
            .send()
            .await
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;
        decode_response(response).await
    }

    async fn get_json<TRes>(&self, path: &str) -> Result<TRes, CliError>
    where
        TRes: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|err| CliError::HttpTransport(err.to_string()))?;
        decode_response(response).await
    }
}

async fn decode_response<TRes>(response: reqwest::Response) -> Result<TRes, CliError>
where
    TRes: for<'de> Deserialize<'de>,
{
    if response.status() != StatusCode::OK {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unable to read body>".to_string());
        return Err(status_error(status, body));
    }

    response
        .json::<TRes>()
        .await
        .map_err(|err| CliError::Decode(err.to_string()))
}

/// Prefer the gateway's `{"error": ...}` text over the raw body.
fn status_error(status: u16, body: String) -> CliError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => CliError::Gateway {
            status,
            error: parsed.error,
        },
        Err(_) => CliError::HttpStatus { status, body },
    }
}

/// Build a one-shot conversation, optionally led by a system instruction.
pub fn single_turn(message: String, system: Option<String>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(message));
    messages
}

pub fn format_models(models: &[ModelInfo]) -> String {
    if models.is_empty() {
        return "No models available.".to_string();
    }
    models
        .iter()
        .map(|model| {
            format!(
                "{} ({}) family={} vendor={} max_input_tokens={}",
                model.id, model.name, model.family, model.vendor, model.max_input_tokens
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_usage(response: &ChatResponse) -> String {
    format!(
        "tokens: {} in / {} out",
        response.usage.input_tokens, response.usage.output_tokens
    )
}

pub async fn run(cli: Cli) -> Result<String, CliError> {
    let client = CliClient::new(cli.server)?;
    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            Ok(format!("gateway status: {}", health.status))
        }
        Commands::Models => {
            let models = client.models().await?;
            Ok(format_models(&models))
        }
        Commands::Chat {
            model,
            message,
            system,
        } => {
            if message.trim().is_empty() {
                return Err(CliError::InvalidArgument(
                    "message cannot be empty".to_string(),
                ));
            }
            let response = client.chat(&model, &single_turn(message, system)).await?;
            Ok(format!("{}\n\n{}", response.content, format_usage(&response)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_models, run, single_turn, status_error, Cli, CliClient, CliError, Commands};
    use clap::Parser;
    use httpmock::{
        Method::{GET, POST},
        MockServer,
    };
    use parley_protocol::{Message, ModelInfo, Role};
    use serde_json::json;

    fn network_tests_enabled() -> bool {
        matches!(std::env::var("PARLEY_RUN_NETWORK_TESTS"), Ok(value) if value == "1")
    }

    #[test]
    fn cli_parses_chat_command() {
        let cli = Cli::parse_from([
            "parley",
            "--server",
            "http://localhost:9000",
            "chat",
            "gpt-4o",
            "hello",
            "--system",
            "be brief",
        ]);

        assert_eq!(cli.server, "http://localhost:9000");
        match cli.command {
            Commands::Chat {
                model,
                message,
                system,
            } => {
                assert_eq!(model, "gpt-4o");
                assert_eq!(message, "hello");
                assert_eq!(system.as_deref(), Some("be brief"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_models_command() {
        let cli = Cli::parse_from(["parley", "models"]);
        assert!(matches!(cli.command, Commands::Models));
    }

    #[test]
    fn single_turn_puts_system_first() {
        let messages = single_turn("hi".to_string(), Some("rules".to_string()));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], Message::user("hi"));

        assert_eq!(single_turn("hi".to_string(), None), vec![Message::user("hi")]);
    }

    #[test]
    fn status_error_prefers_gateway_error_text() {
        match status_error(404, r#"{"error":"Model not found: x"}"#.to_string()) {
            CliError::Gateway { status, error } => {
                assert_eq!(status, 404);
                assert_eq!(error, "Model not found: x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            status_error(502, "bad gateway".to_string()),
            CliError::HttpStatus { status: 502, .. }
        ));
    }

    #[test]
    fn format_models_lists_each_model() {
        assert_eq!(format_models(&[]), "No models available.");
        let listed = format_models(&[ModelInfo {
            id: "gpt-4o".to_string(),
            name: "GPT-4o".to_string(),
            family: "gpt-4o".to_string(),
            vendor: "openai".to_string(),
            max_input_tokens: 128_000,
        }]);
        assert!(listed.contains("gpt-4o (GPT-4o)"));
        assert!(listed.contains("max_input_tokens=128000"));
    }

    #[tokio::test]
    async fn chat_rejects_empty_model() {
        let client = CliClient::new("http://127.0.0.1:3434").unwrap();
        let error = client.chat(" ", &[Message::user("hi")]).await.unwrap_err();
        match error {
            CliError::InvalidArgument(message) => assert!(message.contains("model")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_posts_conversation_to_gateway() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        let chat_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat").json_body(json!({
                    "model": "gpt-4o",
                    "messages": [{"role": "user", "content": "hi"}]
                }));
                then.status(200).json_body(json!({
                    "content": "hello",
                    "usage": {"input_tokens": 1, "output_tokens": 1}
                }));
            })
            .await;

        let client = CliClient::new(server.base_url()).unwrap();
        let response = client.chat("gpt-4o", &[Message::user("hi")]).await.unwrap();

        chat_mock.assert_async().await;
        assert_eq!(response.content, "hello");
        assert_eq!(response.usage.output_tokens, 1);
    }

    #[tokio::test]
    async fn chat_surfaces_gateway_error() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat");
                then.status(403)
                    .json_body(json!({"error": "Permission denied: consent required"}));
            })
            .await;

        let client = CliClient::new(server.base_url()).unwrap();
        let error = client.chat("gpt-4o", &[Message::user("hi")]).await.unwrap_err();

        match error {
            CliError::Gateway { status, error } => {
                assert_eq!(status, 403);
                assert!(error.contains("consent required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn models_command_formats_listing() {
        if !network_tests_enabled() {
            eprintln!("skipping network test: set PARLEY_RUN_NETWORK_TESTS=1 to enable");
            return;
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models");
                then.status(200).json_body(json!([{
                    "id": "gpt-4o",
                    "name": "GPT-4o",
                    "family": "gpt-4o",
                    "vendor": "openai",
                    "maxInputTokens": 128000
                }]));
            })
            .await;

        let base_url = server.base_url();
        let cli = Cli::parse_from(["parley", "--server", base_url.as_str(), "models"]);
        let output = run(cli).await.unwrap();
        assert!(output.starts_with("gpt-4o (GPT-4o)"));
    }
}

//! Chat orchestrator implementation

use std::sync::Arc;
use std::time::Instant;

use parley_context::{adapt, BudgetManager, BudgetPolicy};
use parley_protocol::{ChatRequest, ChatResponse, Message, ModelInfo, Usage};
use parley_runtime::{collect_text, ModelDescriptor, ModelProvider, TokenInput};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::error::ChatError;
use crate::metrics::{BUDGET_ACTIONS, CHAT_ERRORS, CHAT_LATENCY, CHAT_TURNS_TOTAL, TOKENS_TOTAL};

pub type ChatTurnResult = Result<ChatResponse, ChatError>;

/// First descriptor whose id or family equals `query`.
pub fn resolve_model<'a>(models: &'a [ModelDescriptor], query: &str) -> Option<&'a ModelDescriptor> {
    models
        .iter()
        .find(|model| model.id == query || model.family == query)
}

/// Wire form of a descriptor for `GET /models`.
pub fn model_info(model: &ModelDescriptor) -> ModelInfo {
    ModelInfo {
        id: model.id.clone(),
        name: model.name.clone(),
        family: model.family.clone(),
        vendor: model.vendor.clone(),
        max_input_tokens: model.max_input_tokens,
    }
}

/// Stateless coordinator for chat turns. Share it behind an `Arc`.
pub struct ChatOrchestrator {
    provider: Arc<dyn ModelProvider>,
    budget: BudgetManager,
}

impl ChatOrchestrator {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: BudgetPolicy) -> Self {
        let budget = BudgetManager::new(provider.clone(), policy);
        Self { provider, budget }
    }

    /// Models currently offered by the provider. An empty list is not an error.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ChatError> {
        let models = self.provider.list_models().await.map_err(|err| {
            warn!(error = %err, "Model listing failed");
            ChatError::Internal(err.to_string())
        })?;
        Ok(models.iter().map(model_info).collect())
    }

    /// Validate a raw `POST /chat` body, then run the turn.
    ///
    /// Validation happens before any provider call.
    pub async fn handle_request_body(&self, body: &[u8]) -> ChatTurnResult {
        let request = ChatRequest::from_slice(body).map_err(|err| {
            debug!(error = ?err, "Rejected chat request");
            CHAT_ERRORS.with_label_values(&["invalid_request"]).inc();
            ChatError::from(err)
        })?;
        self.handle_chat_turn(&request.model, &request.messages).await
    }

    /// Run one chat turn against the model named by `model_id`.
    pub async fn handle_chat_turn(&self, model_id: &str, conversation: &[Message]) -> ChatTurnResult {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("chat_turn", %turn_id, model = %model_id, messages = conversation.len());

        async move {
            let started = Instant::now();
            let result = self.run_turn(model_id, conversation).await;
            CHAT_LATENCY.observe(started.elapsed().as_secs_f64());

            match &result {
                Ok(response) => info!(
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Chat turn completed"
                ),
                Err(err) => {
                    CHAT_ERRORS.with_label_values(&[err.error_type()]).inc();
                    warn!(error = %err, error_type = err.error_type(), "Chat turn failed");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_turn(&self, model_id: &str, conversation: &[Message]) -> ChatTurnResult {
        let models = self
            .provider
            .list_models()
            .await
            .map_err(|err| ChatError::Internal(err.to_string()))?;
        let model = resolve_model(&models, model_id)
            .ok_or_else(|| ChatError::ModelNotFound(model_id.to_string()))?;
        CHAT_TURNS_TOTAL.with_label_values(&[model.id.as_str()]).inc();

        let native = adapt(conversation);
        let outcome = self
            .budget
            .ensure_within_budget(&native, model, conversation)
            .await?;
        BUDGET_ACTIONS
            .with_label_values(&[outcome.action.as_str()])
            .inc();

        debug!(
            model = %model.id,
            sent = outcome.messages.len(),
            input_tokens = outcome.input_tokens,
            "Issuing completion"
        );
        let stream = self.provider.complete(model, &outcome.messages).await?;
        let content = collect_text(stream).await?;

        let output_tokens = self
            .provider
            .count_tokens(model, TokenInput::Text(&content))
            .await?;

        TOKENS_TOTAL
            .with_label_values(&["input"])
            .inc_by(outcome.input_tokens as f64);
        TOKENS_TOTAL
            .with_label_values(&["output"])
            .inc_by(output_tokens as f64);

        Ok(ChatResponse {
            content,
            usage: Usage {
                input_tokens: outcome.input_tokens,
                output_tokens,
            },
        })
    }
}

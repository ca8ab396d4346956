//! Context budget manager implementation

use std::sync::Arc;

use parley_protocol::Message;
use parley_runtime::{
    collect_text, ModelDescriptor, ModelProvider, NativeMessage, ProviderError, TokenInput,
};
use tracing::{debug, info, warn};

use crate::error::{ContextError, ContextResult};
use crate::summary::{last_user_message, summary_request};
use crate::window::BudgetPolicy;

/// What the manager did to fit the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetAction {
    Unchanged,
    Summarized,
    Truncated,
}

impl BudgetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetAction::Unchanged => "unchanged",
            BudgetAction::Summarized => "summarized",
            BudgetAction::Truncated => "truncated",
        }
    }
}

/// Messages to send and their token count.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetOutcome {
    pub messages: Vec<NativeMessage>,
    /// Token count of `messages`, recounted whenever they changed
    pub input_tokens: usize,
    pub action: BudgetAction,
}

/// Keeps a conversation inside a model's input-token budget.
///
/// Holds no per-conversation state; one manager serves concurrent turns.
pub struct BudgetManager {
    provider: Arc<dyn ModelProvider>,
    policy: BudgetPolicy,
}

impl BudgetManager {
    pub fn new(provider: Arc<dyn ModelProvider>, policy: BudgetPolicy) -> Self {
        Self { provider, policy }
    }

    /// Sum of per-message token counts, one provider call per message.
    pub async fn count_tokens(
        &self,
        model: &ModelDescriptor,
        messages: &[NativeMessage],
    ) -> ContextResult<usize> {
        let mut total = 0;
        for message in messages {
            total += self
                .provider
                .count_tokens(model, TokenInput::Message(message))
                .await
                .map_err(ContextError::TokenCountError)?;
        }
        Ok(total)
    }

    /// Return the messages to send for this turn.
    ///
    /// `native` is the adapted form of `original`. Neither is modified; an
    /// over-budget conversation is summarized once, and truncated to the
    /// last few adapted messages if the summary request fails.
    pub async fn ensure_within_budget(
        &self,
        native: &[NativeMessage],
        model: &ModelDescriptor,
        original: &[Message],
    ) -> ContextResult<BudgetOutcome> {
        let input_tokens = self.count_tokens(model, native).await?;
        let threshold = self.policy.threshold(model.max_input_tokens);

        if input_tokens <= threshold {
            debug!(model = %model.id, input_tokens, threshold, "Conversation within budget");
            return Ok(BudgetOutcome {
                messages: native.to_vec(),
                input_tokens,
                action: BudgetAction::Unchanged,
            });
        }

        info!(
            model = %model.id,
            input_tokens,
            threshold,
            messages = native.len(),
            "Conversation over budget, summarizing"
        );

        let (messages, action) = match self.summarize(model, original).await {
            Ok(summary) => (
                self.summarized_messages(&summary, original),
                BudgetAction::Summarized,
            ),
            Err(err) => {
                warn!(
                    model = %model.id,
                    error = %err,
                    keep = self.policy.truncate_keep,
                    "Summarization failed, truncating history"
                );
                (
                    truncate_tail(native, self.policy.truncate_keep),
                    BudgetAction::Truncated,
                )
            }
        };

        let input_tokens = self.count_tokens(model, &messages).await?;
        debug!(model = %model.id, input_tokens, action = action.as_str(), "Budget applied");

        Ok(BudgetOutcome {
            messages,
            input_tokens,
            action,
        })
    }

    async fn summarize(
        &self,
        model: &ModelDescriptor,
        original: &[Message],
    ) -> Result<String, ProviderError> {
        let request = [summary_request(original)];
        let stream = self.provider.complete(model, &request).await?;
        collect_text(stream).await
    }

    fn summarized_messages(&self, summary: &str, original: &[Message]) -> Vec<NativeMessage> {
        let mut messages = vec![NativeMessage::user(format!(
            "{}{summary}",
            self.policy.summary_prefix
        ))];
        if let Some(last_user) = last_user_message(original) {
            messages.push(NativeMessage::user(last_user.content.clone()));
        }
        messages
    }
}

/// Last `keep` messages, or all of them when there are fewer.
fn truncate_tail(messages: &[NativeMessage], keep: usize) -> Vec<NativeMessage> {
    messages[messages.len().saturating_sub(keep)..].to_vec()
}

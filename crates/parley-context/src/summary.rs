//! Summarization prompt construction

use parley_protocol::{Message, Role};
use parley_runtime::NativeMessage;

pub const SUMMARY_INSTRUCTION: &str = "Please provide a concise summary of the following conversation, preserving key context and decisions:";

/// One `role: content` line per message, separated by a blank line.
pub fn render_transcript(conversation: &[Message]) -> String {
    conversation
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The single user-channel request asking the model for a summary.
pub fn summary_request(conversation: &[Message]) -> NativeMessage {
    NativeMessage::user(format!(
        "{SUMMARY_INSTRUCTION}\n\n{}",
        render_transcript(conversation)
    ))
}

pub fn last_user_message(conversation: &[Message]) -> Option<&Message> {
    conversation
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
}

//! Wire conversation to native provider messages.
//!
//! `system` and `user` both land on the user channel. Order and length
//! are preserved: one native message per input message.

use parley_protocol::{Message, Role};
use parley_runtime::NativeMessage;

pub fn adapt_message(message: &Message) -> NativeMessage {
    match message.role {
        Role::System | Role::User => NativeMessage::user(message.content.clone()),
        Role::Assistant => NativeMessage::assistant(message.content.clone()),
    }
}

pub fn adapt(conversation: &[Message]) -> Vec<NativeMessage> {
    conversation.iter().map(adapt_message).collect()
}

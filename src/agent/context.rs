//! Message context builder.
//!
//! Flattens a [`ConversationTurn`] into the chat-message list an engine
//! consumes. Consecutive tool calls become one assistant message, each
//! tool result becomes a tool message correlated by call id.

use crate::types::*;
use tracing::debug;

/// Build the full message history for an engine call.
pub fn build_messages(system_prompt: &str, turn: &ConversationTurn) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turn.len() + 1);

    if !system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: Some(system_prompt.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }

    for msg in turn.messages() {
        match msg {
            TurnMessage::Request { content } => messages.push(ChatMessage {
                role: ChatRole::User,
                content: Some(content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }),
            TurnMessage::ToolCall(call) => match messages.last_mut() {
                Some(last) if last.role == ChatRole::Assistant && last.content.is_none() => {
                    last.tool_calls.push(call.clone());
                }
                _ => messages.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: None,
                    tool_calls: vec![call.clone()],
                    tool_call_id: None,
                }),
            },
            TurnMessage::ToolResult(result) => messages.push(ChatMessage {
                role: ChatRole::Tool,
                content: Some(result.render()),
                tool_calls: Vec::new(),
                tool_call_id: Some(result.call_id.clone()),
            }),
            TurnMessage::FinalAnswer { content } => messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content: Some(content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: None,
            }),
        }
    }

    debug!("Built {} engine messages from {} turn messages", messages.len(), turn.len());
    messages
}

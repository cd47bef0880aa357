//! Append-only conversation owned by one agent loop

use crate::dispatch::ToolResult;
use crate::llm::{ContentBlock, LlmMessage, MessageRole, ToolChoice};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<LlmMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    ///
    /// Tool results following another tool-result message are folded into it,
    /// so one step's results reach the provider as a single user turn.
    pub fn push(&mut self, message: LlmMessage) {
        if is_tool_results(&message) {
            if let Some(last) = self.messages.last_mut() {
                if is_tool_results(last) {
                    last.content.extend(message.content);
                    return;
                }
            }
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[LlmMessage] {
        &self.messages
    }

    pub fn has_tool_result(&self) -> bool {
        self.tool_results().next().is_some()
    }

    /// `Required` until some tool has answered, then `Auto`
    pub fn tool_choice(&self) -> ToolChoice {
        if self.has_tool_result() {
            ToolChoice::Auto
        } else {
            ToolChoice::Required
        }
    }

    /// Every tool result in conversation order
    pub fn tool_results(&self) -> impl Iterator<Item = ToolResult> + '_ {
        self.messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|block| match block {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(ToolResult {
                    tool_call_id: tool_use_id.clone(),
                    content: content.clone(),
                    is_error: *is_error,
                }),
                _ => None,
            })
    }

    /// Parsed payloads of successful tool results
    pub fn evidence(&self) -> Vec<Value> {
        self.tool_results()
            .filter(|r| !r.is_error)
            .filter_map(|r| serde_json::from_str(&r.content).ok())
            .collect()
    }
}

fn is_tool_results(message: &LlmMessage) -> bool {
    message.role == MessageRole::User
        && !message.content.is_empty()
        && message
            .content
            .iter()
            .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
}

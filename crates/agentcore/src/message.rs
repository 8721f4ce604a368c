// Conversation message types.
//
// A flat representation: role plus a plain-text content field, with optional
// reasoning/tool-call/tool-result side channels. This mirrors the shape the
// underlying chat-completions wire format expects, so building a provider
// request is a near-direct map over `Vec<Message>`.

use crate::tool_types::ToolCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,

    /// Plain text content. Empty string for assistant messages that are
    /// pure tool calls with no accompanying text.
    pub content: String,

    /// Reasoning/thinking trace accompanying an assistant message, when the
    /// provider surfaces one. Never sent back to the provider as content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Tool calls requested by the assistant (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Correlates a tool-role message with the tool_call it answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Name of the tool that produced a tool-role message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content.into())
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content.into());
        msg.tool_calls = Some(tool_calls);
        msg
    }

    pub fn assistant_with_reasoning(content: impl Into<String>, reasoning: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Assistant, content.into());
        msg.reasoning = Some(reasoning.into());
        msg
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_name = Some(tool_name.into());
        msg
    }

    fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            content,
            reasoning: None,
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            created_at: Utc::now(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn assistant_with_tool_calls_round_trips() {
        let calls = vec![ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: serde_json::json!({"city": "NYC"}),
        }];
        let msg = Message::assistant_with_tool_calls("", calls);
        assert!(msg.has_tool_calls());

        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert!(parsed.has_tool_calls());
    }

    #[test]
    fn tool_message_carries_correlation_id() {
        let msg = Message::tool("call_123", "get_weather", "72F");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    }
}

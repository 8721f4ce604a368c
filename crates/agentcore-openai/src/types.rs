// Wire types for the OpenAI chat completions protocol. Kept separate from
// `provider.rs` so the request/response shapes can be read (and tested)
// independent of the HTTP/SSE plumbing around them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentcore::{Message, MessageRole, ToolCall, ToolDefinition};

#[derive(Debug, Serialize)]
pub(crate) struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiTool {
    pub r#type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiToolCall {
    pub id: String,
    pub r#type: String,
    pub function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OpenAiFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChunk {
    pub choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamChoice {
    pub delta: OpenAiDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OpenAiDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamToolCall {
    pub index: usize,
    pub id: Option<String>,
    pub function: Option<OpenAiStreamFunction>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiStreamFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Best-known output-token ceiling per model family. Conservative fallback
/// for anything unrecognized, since silently sending an over-limit value is
/// worse than a capped one.
fn max_tokens_ceiling(model: &str) -> u32 {
    if model.starts_with("gpt-4o") || model.starts_with("gpt-4.1") {
        16_384
    } else if model.starts_with("o1") || model.starts_with("o3") {
        100_000
    } else if model.starts_with("gpt-3.5") {
        4_096
    } else {
        8_192
    }
}

/// Clamp a requested `max_tokens` to the model's known ceiling, logging a
/// warning when the caller asked for more than the provider will accept.
pub(crate) fn clamp_max_tokens(model: &str, requested: Option<u32>) -> Option<u32> {
    let requested = requested?;
    let ceiling = max_tokens_ceiling(model);
    if requested > ceiling {
        tracing::warn!(model, requested, ceiling, "clamping max_tokens to model ceiling");
        Some(ceiling)
    } else {
        Some(requested)
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

pub(crate) fn convert_message(message: &Message) -> OpenAiMessage {
    OpenAiMessage {
        role: role_str(message.role).to_string(),
        content: if message.content.is_empty() && message.has_tool_calls() {
            None
        } else {
            Some(message.content.clone())
        },
        tool_calls: message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: serde_json::to_string(&call.arguments).unwrap_or_default(),
                    },
                })
                .collect()
        }),
        tool_call_id: message.tool_call_id.clone(),
    }
}

pub(crate) fn convert_tools(tools: &[ToolDefinition]) -> Vec<OpenAiTool> {
    tools
        .iter()
        .map(|tool| OpenAiTool {
            r#type: "function".to_string(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

/// Partially assembled tool call, accumulated across stream chunks until its
/// argument fragments are complete and it can be parsed into a `ToolCall`.
#[derive(Debug, Default, Clone)]
pub(crate) struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

pub(crate) fn finalize_tool_calls(pending: Vec<PendingToolCall>) -> Vec<ToolCall> {
    pending
        .into_iter()
        .map(|p| ToolCall {
            id: p.id,
            name: p.name,
            arguments: serde_json::from_str(&p.arguments).unwrap_or(Value::String(p.arguments)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_user_message() {
        let msg = Message::user("hello");
        let converted = convert_message(&msg);
        assert_eq!(converted.role, "user");
        assert_eq!(converted.content.as_deref(), Some("hello"));
    }

    #[test]
    fn tool_call_message_omits_content_when_empty() {
        let calls = vec![ToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: serde_json::json!({"city": "NYC"}),
        }];
        let msg = Message::assistant_with_tool_calls("", calls);
        let converted = convert_message(&msg);
        assert!(converted.content.is_none());
        assert_eq!(converted.tool_calls.unwrap().len(), 1);
    }

    #[test]
    fn clamps_max_tokens_to_model_ceiling() {
        assert_eq!(clamp_max_tokens("gpt-4o", Some(100_000)), Some(16_384));
        assert_eq!(clamp_max_tokens("gpt-4o", Some(1_000)), Some(1_000));
        assert_eq!(clamp_max_tokens("gpt-4o", None), None);
    }

    #[test]
    fn finalize_parses_accumulated_json_arguments() {
        let pending = vec![PendingToolCall {
            id: "call_1".into(),
            name: "get_weather".into(),
            arguments: r#"{"city": "NYC"}"#.into(),
        }];
        let calls = finalize_tool_calls(pending);
        assert_eq!(calls[0].arguments["city"], "NYC");
    }
}

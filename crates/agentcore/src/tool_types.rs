// Tool definitions and policies for agent execution.
//
// Tools are identified by name (string) for extensibility. Execution happens
// via whatever implements `ToolExecutor`, which looks tools up by name.

use serde::{Deserialize, Serialize};

/// Tool policy determines how tool calls are handled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    /// Execute immediately without user approval.
    #[default]
    Auto,
    /// Require approval before execution (human-in-the-loop).
    RequiresApproval,
}

/// A tool's schema, as presented to the LLM (OpenAI function-calling shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (used by the LLM and for registry lookup).
    pub name: String,
    /// Tool description for the LLM.
    pub description: String,
    /// JSON schema for tool parameters.
    pub parameters: serde_json::Value,
    /// Tool policy (auto or requires_approval).
    #[serde(default)]
    pub policy: ToolPolicy,
}

/// Tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call (correlates with the result).
    pub id: String,
    /// Tool name to execute.
    pub name: String,
    /// Arguments as JSON.
    pub arguments: serde_json::Value,
}

/// Outcome of executing a single tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool call ID this result corresponds to.
    pub tool_call_id: String,
    /// Whether the tool call succeeded.
    pub success: bool,
    /// Result content (success) — already truncated/formatted for the LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Error message (failure), safe to show to the LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition_round_trips() {
        let json = r#"{
            "name": "fetch_data",
            "description": "Fetch data from URL",
            "parameters": {"type": "object"}
        }"#;

        let def: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.name, "fetch_data");
        assert_eq!(def.policy, ToolPolicy::Auto);
    }

    #[test]
    fn tool_definition_requires_approval() {
        let json = r#"{
            "name": "delete_file",
            "description": "Delete a file",
            "parameters": {"type": "object"},
            "policy": "requires_approval"
        }"#;

        let def: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.policy, ToolPolicy::RequiresApproval);
    }

    #[test]
    fn tool_call_round_trips() {
        let call = ToolCall {
            id: "call_123".to_string(),
            name: "get_weather".to_string(),
            arguments: serde_json::json!({"city": "New York"}),
        };

        let json = serde_json::to_string(&call).unwrap();
        let parsed: ToolCall = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.id, call.id);
        assert_eq!(parsed.name, call.name);
    }

    #[test]
    fn tool_result_success_and_failure() {
        let ok = ToolResult::success("call_1", "72F");
        assert!(ok.success);
        assert_eq!(ok.content.as_deref(), Some("72F"));

        let err = ToolResult::failure("call_2", "City not found");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("City not found"));
    }
}

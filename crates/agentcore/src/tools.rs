// Tool abstraction for agent execution.
//
// Tools are defined via the `Tool` trait and registered with a `ToolRegistry`,
// which the agent step loop uses to look calls up by name and dispatch them.
//
// Error handling distinguishes between user-visible errors (shown to the LLM
// so it can recover) and internal errors (logged, then replaced with a
// generic message before reaching the LLM).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

use crate::error::{AgentError, Result};
use crate::tool_types::{ToolCall, ToolDefinition, ToolPolicy, ToolResult};

/// Outcome of a single tool execution, before it's been shaped into a
/// `ToolResult` for the message history.
#[derive(Debug)]
pub enum ToolExecutionResult {
    /// Successful execution; content is already the text to show the LLM.
    Success(String),
    /// Tool-level error, safe to show to the LLM (e.g. "city not found").
    ToolError(String),
    /// Internal/system error. Logged in full, replaced with a generic
    /// message before it reaches the LLM.
    InternalError(String),
}

impl ToolExecutionResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolExecutionResult::Success(content.into())
    }

    pub fn tool_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::ToolError(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ToolExecutionResult::InternalError(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolExecutionResult::Success(_))
    }

    /// Shape into the `ToolResult` that gets fed back to the LLM, hiding
    /// internal error detail behind a generic message.
    pub fn into_tool_result(self, tool_call_id: &str, tool_name: &str) -> ToolResult {
        match self {
            ToolExecutionResult::Success(content) => ToolResult::success(tool_call_id, content),
            ToolExecutionResult::ToolError(message) => ToolResult::failure(tool_call_id, message),
            ToolExecutionResult::InternalError(message) => {
                error!(
                    tool_name,
                    tool_call_id,
                    error = %message,
                    "tool internal error (details hidden from LLM)"
                );
                ToolResult::failure(
                    tool_call_id,
                    "An internal error occurred while executing the tool",
                )
            }
        }
    }
}

/// Trait for implementing tools executable by the agent step loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name. Must not collide with another tool in the same registry.
    fn name(&self) -> &str;

    /// Description shown to the LLM.
    fn description(&self) -> &str;

    /// JSON-Schema for the tool's parameters (OpenAI function-calling shape).
    fn parameters_schema(&self) -> Value;

    /// Execute with the given arguments.
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;

    /// Tool policy. Default: executes immediately.
    fn policy(&self) -> ToolPolicy {
        ToolPolicy::Auto
    }

    /// Whether this tool contributes instruction text to the system prompt
    /// during assembly (e.g. SpawnAgentTool teaching callers how to delegate).
    fn add_instructions_to_prompt(&self) -> bool {
        false
    }

    /// Instruction text contributed to the system prompt, when
    /// `add_instructions_to_prompt` is true.
    fn instructions(&self) -> Option<String> {
        None
    }

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
            policy: self.policy(),
        }
    }
}

/// A registry of tools, keyed by name, doubling as the step loop's dispatcher.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            tracing::warn!(tool = %name, "registering tool with a name already in use; replacing the existing one");
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.remove(name)
    }

    /// Build a new registry restricted to the named subset. Unknown names
    /// are silently skipped (callers validate names separately when they
    /// need to surface an error for a bad request).
    pub fn subset(&self, names: &[String]) -> Self {
        let mut subset = Self::new();
        for name in names {
            if let Some(tool) = self.tools.get(name) {
                subset.register_arc(tool.clone());
            }
        }
        subset
    }

    /// Instruction text contributed by tools that opt into prompt assembly,
    /// concatenated in registration order.
    pub fn prompt_instructions(&self) -> Vec<String> {
        self.tools
            .values()
            .filter(|t| t.add_instructions_to_prompt())
            .filter_map(|t| t.instructions())
            .collect()
    }

    /// Execute a single tool call by name, timing the call for the audit
    /// trail and clamping internal errors before they reach the LLM.
    pub async fn execute(&self, tool_call: &ToolCall) -> Result<(ToolResult, std::time::Duration)> {
        let started = Instant::now();
        let Some(tool) = self.tools.get(&tool_call.name) else {
            warn!(tool = %tool_call.name, "tool call referenced an unregistered tool");
            return Ok((
                ToolResult::failure(
                    &tool_call.id,
                    format!("Unknown tool: {}", tool_call.name),
                ),
                started.elapsed(),
            ));
        };

        let outcome = tool.execute(tool_call.arguments.clone()).await;
        let result = outcome.into_tool_result(&tool_call.id, &tool_call.name);
        Ok((result, started.elapsed()))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

// ============================================================================
// Built-in example/test tools
// ============================================================================

/// Echoes back its arguments. Useful for tests and examples.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided message. Useful for testing tool execution."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "The message to echo back"}
            },
            "required": ["message"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let message = arguments.get("message").and_then(|v| v.as_str()).unwrap_or("");
        ToolExecutionResult::success(message.to_string())
    }
}

/// Always fails. Useful for exercising error-handling paths.
pub struct FailingTool {
    error_message: String,
    internal: bool,
}

impl FailingTool {
    pub fn with_tool_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            internal: false,
        }
    }

    pub fn with_internal_error(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            internal: true,
        }
    }
}

impl Default for FailingTool {
    fn default() -> Self {
        Self::with_tool_error("Tool execution failed")
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing_tool"
    }

    fn description(&self) -> &str {
        "A tool that always fails (for testing error handling)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        if self.internal {
            ToolExecutionResult::internal_error(&self.error_message)
        } else {
            ToolExecutionResult::tool_error(&self.error_message)
        }
    }
}

/// Convenience conversion used when a tool call references a definition
/// that isn't backed by a registered Tool (e.g. during dispatch validation).
pub fn tool_not_found(name: &str) -> AgentError {
    AgentError::tool_not_found(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_tool_round_trips_message() {
        let tool = EchoTool;
        let result = tool.execute(serde_json::json!({"message": "hi"})).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn failing_tool_reports_tool_error() {
        let tool = FailingTool::with_tool_error("bad input");
        match tool.execute(serde_json::json!({})).await {
            ToolExecutionResult::ToolError(msg) => assert_eq!(msg, "bad input"),
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_error_is_hidden_from_llm() {
        let result = ToolExecutionResult::internal_error("db down");
        let tool_result = result.into_tool_result("call_1", "some_tool");
        assert!(!tool_result.success);
        assert_ne!(tool_result.error.as_deref(), Some("db down"));
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"message": "test"}),
        };

        let (result, _elapsed) = registry.execute(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn registry_reports_unknown_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };

        let (result, _elapsed) = registry.execute(&call).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nonexistent"));
    }

    #[test]
    fn subset_keeps_only_named_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool::default());

        let subset = registry.subset(&["echo".to_string()]);
        assert!(subset.has("echo"));
        assert!(!subset.has("failing_tool"));
    }
}

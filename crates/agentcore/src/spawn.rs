// SpawnAgentTool: lets an agent instantiate a depth-limited child agent to
// work a focused sub-task. Composes directly on top of the step loop in
// `agent.rs` -- the child is just another `Agent::run`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::events::StepEvent;
use crate::llm::LlmProvider;
use crate::run_logger::RunLogger;
use crate::tools::{Tool, ToolExecutionResult};
use crate::tools::ToolRegistry;

const TASK_PREVIEW_CHARS: usize = 300;
const DEFAULT_CHILD_MAX_STEPS: usize = 10;
const CHILD_MAX_STEPS_CEILING: usize = 30;

pub const SPAWN_TOOL_NAME: &str = "spawn_agent";

/// A tool that delegates to a depth-bounded child agent. Every instance
/// carries its own `current_depth`; constructing a fresh instance with an
/// incremented depth each time a child is spawned is what keeps the bound
/// meaningful across a chain of delegations.
pub struct SpawnAgentTool {
    tools: ToolRegistry,
    llm: Arc<dyn LlmProvider>,
    model: String,
    workspace_dir: String,
    current_depth: usize,
    max_depth: usize,
}

impl SpawnAgentTool {
    pub fn new(
        tools: ToolRegistry,
        llm: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        workspace_dir: impl Into<String>,
        current_depth: usize,
        max_depth: usize,
    ) -> Self {
        Self {
            tools,
            llm,
            model: model.into(),
            workspace_dir: workspace_dir.into(),
            current_depth,
            max_depth,
        }
    }

    fn depth_exceeded_message(&self) -> String {
        AgentError::DepthExceeded(self.max_depth).to_string()
    }

    /// Build the child's tool registry per the inheritance rules: named
    /// subset or full inheritance, with `spawn_agent` either replaced by a
    /// fresh deeper instance or dropped when the child would already be at
    /// the depth ceiling.
    fn child_tools(&self, requested: Option<&[String]>) -> ToolRegistry {
        let child_depth = self.current_depth + 1;
        let mut tools = match requested {
            Some(names) => self.tools.subset(names),
            None => self.tools.clone(),
        };

        tools.unregister(SPAWN_TOOL_NAME);
        if child_depth < self.max_depth && tools_requested_spawn(requested, &self.tools) {
            tools.register(SpawnAgentTool::new(
                tools.clone(),
                self.llm.clone(),
                self.model.clone(),
                self.workspace_dir.clone(),
                child_depth,
                self.max_depth,
            ));
        }

        tools
    }

    fn child_system_prompt(&self, role: Option<&str>, context: Option<&str>, child_depth: usize) -> String {
        let mut prompt = match role {
            Some(role) => format!("You are a specialized assistant acting as a **{role}**."),
            None => "You are a specialized assistant focused on a delegated task.".to_string(),
        };

        prompt.push_str(
            "\n\nFocus exclusively on completing the delegated task below efficiently and \
             accurately. Do not ask clarifying questions; make reasonable assumptions and state \
             them if relevant.",
        );

        if let Some(context) = context {
            if !context.is_empty() {
                prompt.push_str(&format!("\n\nContext:\n{context}"));
            }
        }

        prompt.push_str(&format!("\n\nCurrent Workspace: {}", self.workspace_dir));

        if child_depth < self.max_depth {
            prompt.push_str(&format!(
                "\n\nYou may spawn further sub-agents, up to depth {}.",
                self.max_depth
            ));
        }

        prompt
    }
}

fn tools_requested_spawn(requested: Option<&[String]>, parent_tools: &ToolRegistry) -> bool {
    match requested {
        Some(names) => names.iter().any(|n| n == SPAWN_TOOL_NAME),
        None => parent_tools.has(SPAWN_TOOL_NAME),
    }
}

#[derive(serde::Deserialize)]
struct SpawnArgs {
    task: String,
    role: Option<String>,
    context: Option<String>,
    tools: Option<Vec<String>>,
    max_steps: Option<usize>,
}

#[async_trait]
impl Tool for SpawnAgentTool {
    fn name(&self) -> &str {
        SPAWN_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Spawn a focused sub-agent to work a delegated task, optionally restricted to a subset of tools."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "The task for the sub-agent to complete"},
                "role": {"type": "string", "description": "Optional role the sub-agent should adopt"},
                "context": {"type": "string", "description": "Optional additional context for the sub-agent"},
                "tools": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional subset of tool names to give the sub-agent; inherits all tools if omitted"
                },
                "max_steps": {
                    "type": "integer",
                    "description": "Optional step budget for the sub-agent (clamped to 1-30)"
                }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    fn add_instructions_to_prompt(&self) -> bool {
        true
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Use spawn_agent to delegate a focused sub-task to a new agent instance. Give it a \
             clear, self-contained task description. Optionally narrow its tool set, add context \
             it wouldn't otherwise have, and set a step budget. Sub-agents cannot see this \
             conversation; anything they need must be passed via task/context."
                .to_string(),
        )
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        if self.current_depth >= self.max_depth {
            return ToolExecutionResult::tool_error(self.depth_exceeded_message());
        }

        let args: SpawnArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(error) => return ToolExecutionResult::tool_error(format!("Invalid arguments: {error}")),
        };

        let child_depth = self.current_depth + 1;
        let max_steps = args
            .max_steps
            .unwrap_or(DEFAULT_CHILD_MAX_STEPS)
            .clamp(1, CHILD_MAX_STEPS_CEILING);

        let child_tools = self.child_tools(args.tools.as_deref());
        let system_prompt = self.child_system_prompt(args.role.as_deref(), args.context.as_deref(), child_depth);

        let config = AgentConfig::builder()
            .system_prompt(system_prompt)
            .model(self.model.clone())
            .max_steps(max_steps)
            .workspace_dir(self.workspace_dir.clone())
            .build();

        let agent = Agent::new("sub-agent", config, child_tools, self.llm.clone());
        let logger = RunLogger::noop(Uuid::now_v7());

        let outcome = match agent.run(&args.task, Vec::new(), &logger).await {
            Ok(outcome) => outcome,
            Err(error) => return ToolExecutionResult::internal_error(error.to_string()),
        };

        let tool_call_count = outcome
            .events
            .iter()
            .filter(|e| matches!(e, StepEvent::ToolResultEvent { .. }))
            .count();

        let task_preview: String = args.task.chars().take(TASK_PREVIEW_CHARS).collect();
        let task_preview = if args.task.chars().count() > TASK_PREVIEW_CHARS {
            format!("{task_preview}...")
        } else {
            task_preview
        };

        let result = format!(
            "## Sub-agent result\n\
             Task: {task_preview}\n\
             Steps: {steps}/{max_steps}\n\
             Tool calls: {tool_call_count}\n\
             Depth: {child_depth}/{max_depth}\n\n\
             {content}",
            steps = outcome.steps,
            max_depth = self.max_depth,
            content = outcome.content,
        );

        ToolExecutionResult::success(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmCallConfig, LlmCompletionMetadata, LlmResponse, LlmResponseStream};
    use crate::message::Message;
    use crate::tools::EchoTool;

    struct OneShotProvider(String);

    #[async_trait]
    impl LlmProvider for OneShotProvider {
        async fn chat_completion_stream(
            &self,
            _messages: &[Message],
            _config: &LlmCallConfig,
        ) -> crate::error::Result<LlmResponseStream> {
            unimplemented!("not exercised by these tests")
        }

        async fn chat_completion(&self, _messages: &[Message], _config: &LlmCallConfig) -> crate::error::Result<LlmResponse> {
            Ok(LlmResponse {
                content: self.0.clone(),
                reasoning: None,
                tool_calls: None,
                metadata: LlmCompletionMetadata::default(),
            })
        }
    }

    #[tokio::test]
    async fn spawns_child_and_shapes_result() {
        let provider = Arc::new(OneShotProvider("child done".to_string()));
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let spawn = SpawnAgentTool::new(tools, provider, "gpt-4o", "./workspace", 0, 3);

        let outcome = spawn
            .execute(serde_json::json!({"task": "summarize this doc", "role": "editor"}))
            .await;

        match outcome {
            ToolExecutionResult::Success(content) => {
                assert!(content.contains("child done"));
                assert!(content.contains("Depth: 1/3"));
                assert!(content.contains("summarize this doc"));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn depth_exceeded_refuses_to_spawn() {
        let provider = Arc::new(OneShotProvider("unused".to_string()));
        let spawn = SpawnAgentTool::new(ToolRegistry::new(), provider, "gpt-4o", "./workspace", 2, 2);

        let outcome = spawn.execute(serde_json::json!({"task": "anything"})).await;
        match outcome {
            ToolExecutionResult::ToolError(msg) => assert!(msg.contains("depth")),
            other => panic!("expected tool error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn task_preview_is_truncated_at_300_chars() {
        let provider = Arc::new(OneShotProvider("done".to_string()));
        let spawn = SpawnAgentTool::new(ToolRegistry::new(), provider, "gpt-4o", "./workspace", 0, 2);
        let long_task = "x".repeat(500);

        let outcome = spawn.execute(serde_json::json!({"task": long_task})).await;
        match outcome {
            ToolExecutionResult::Success(content) => {
                let task_line = content.lines().find(|l| l.starts_with("Task:")).unwrap();
                assert!(task_line.len() < 320);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}

// The agent step loop: the LLM is repeatedly consulted, its tool calls are
// dispatched in order, and results are fed back until a terminal (no-tool)
// response or a step/token limit is hit.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::events::{CompletionReason, RunOutcome, StepEvent};
use crate::llm::{LlmCallConfig, LlmProvider, LlmResponse};
use crate::message::Message;
use crate::run_logger::{LogEventKind, RunLogger};
use crate::token_manager::TokenManager;
use crate::tool_types::{ToolCall, ToolResult};
use crate::tools::ToolRegistry;

const WORKSPACE_FOOTER_PREFIX: &str = "Current Workspace:";
/// Default wall-clock budget for a single tool execution.
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// The step-loop driver. Owns its tool registry, limits, and the pieces
/// (`LlmProvider`, `TokenManager`) needed to run a turn to completion.
/// Stateless across runs: nothing here is mutated by `run`/`run_stream`, so
/// one `Agent` can drive any number of concurrent runs.
pub struct Agent {
    name: String,
    config: AgentConfig,
    tools: ToolRegistry,
    llm: Arc<dyn LlmProvider>,
    token_manager: TokenManager,
}

impl Agent {
    pub fn new(name: impl Into<String>, config: AgentConfig, tools: ToolRegistry, llm: Arc<dyn LlmProvider>) -> Self {
        let token_manager = TokenManager::new(config.token_limit, config.summarize_after_rounds)
            .enabled(config.enable_summarization);
        Self {
            name: name.into(),
            config,
            tools,
            llm,
            token_manager,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Assemble the system prompt: base description, tool-contributed
    /// instructions (for tools that opt in), and an idempotent workspace
    /// footer. Never appends the footer twice.
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        let tool_instructions = self.tools.prompt_instructions();
        if !tool_instructions.is_empty() {
            prompt.push_str("\n\n## Tool instructions\n");
            for instruction in tool_instructions {
                prompt.push_str(&instruction);
                prompt.push('\n');
            }
        }

        if !prompt.contains(WORKSPACE_FOOTER_PREFIX) {
            prompt.push_str(&format!(
                "\n\n{WORKSPACE_FOOTER_PREFIX} {}",
                self.config.workspace_dir
            ));
        }

        prompt
    }

    fn call_config(&self) -> LlmCallConfig {
        LlmCallConfig {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools: self.tools.tool_definitions(),
        }
    }

    /// Run the step loop to completion (blocking: awaits every suspension
    /// point in order, no streaming deltas). `history` is prior session
    /// context rendered as messages, NOT including the system prompt.
    pub async fn run(&self, task: &str, history: Vec<Message>, logger: &RunLogger) -> Result<RunOutcome> {
        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(history);
        messages.push(Message::user(task));

        logger
            .log(LogEventKind::RunStart, serde_json::json!({"agent": self.name, "task": task}))
            .await?;

        let mut events = Vec::new();
        let max_steps = self.config.max_steps.max(1);

        for step in 1..=max_steps {
            let outcome = self
                .token_manager
                .maybe_compress(messages, self.llm.as_ref(), &self.config.model)
                .await?;
            messages = outcome.messages;
            if outcome.compressed {
                let event = StepEvent::HistoryCompressed {
                    estimated_tokens_after: outcome.estimated_tokens,
                };
                logger
                    .log(LogEventKind::Event, serde_json::json!({"estimated_tokens_after": outcome.estimated_tokens}))
                    .await?;
                events.push(event);
            }

            let step_event = StepEvent::Step {
                step,
                max_steps,
                estimated_tokens: outcome.estimated_tokens,
            };
            logger
                .log(LogEventKind::Step, serde_json::json!({"step": step, "max_steps": max_steps}))
                .await?;
            events.push(step_event);

            logger
                .log(LogEventKind::Request, serde_json::json!({"message_count": messages.len()}))
                .await?;

            let response = match self.llm.chat_completion(&messages, &self.call_config()).await {
                Ok(response) => response,
                Err(error) => {
                    let content = format!("LLM call failed: {error}");
                    logger
                        .log(LogEventKind::Response, serde_json::json!({"error": content}))
                        .await?;
                    let completion = StepEvent::Completion {
                        reason: CompletionReason::LlmError,
                        content: content.clone(),
                    };
                    logger
                        .log(LogEventKind::Completion, serde_json::json!({"reason": "llm_error"}))
                        .await?;
                    logger.finalize(step, false).await?;
                    events.push(completion);
                    return Ok(RunOutcome {
                        content,
                        reason: CompletionReason::LlmError,
                        steps: step,
                        events,
                        messages,
                    });
                }
            };

            logger
                .log(
                    LogEventKind::Response,
                    serde_json::json!({
                        "content": response.content,
                        "tool_call_count": response.tool_calls.as_ref().map(|c| c.len()).unwrap_or(0),
                    }),
                )
                .await?;

            let tool_calls = response.tool_calls.clone().unwrap_or_default();
            messages.push(assistant_message(&response));

            if tool_calls.is_empty() {
                let completion = StepEvent::Completion {
                    reason: CompletionReason::TaskCompleted,
                    content: response.content.clone(),
                };
                logger
                    .log(LogEventKind::Completion, serde_json::json!({"reason": "task_completed"}))
                    .await?;
                logger.finalize(step, true).await?;
                events.push(completion);
                return Ok(RunOutcome {
                    content: response.content,
                    reason: CompletionReason::TaskCompleted,
                    steps: step,
                    events,
                    messages,
                });
            }

            for tool_call in &tool_calls {
                let (result, elapsed) = self.dispatch_tool_call(tool_call).await;
                logger
                    .log(
                        LogEventKind::ToolExecution,
                        serde_json::json!({
                            "tool": tool_call.name,
                            "success": result.success,
                            "elapsed_ms": elapsed.as_millis() as u64,
                            "content": result.content,
                            "error": result.error,
                        }),
                    )
                    .await?;
                events.push(StepEvent::ToolResultEvent {
                    tool_call_id: tool_call.id.clone(),
                    tool_name: tool_call.name.clone(),
                    result: result.clone(),
                    elapsed_ms: elapsed.as_millis() as u64,
                });

                let content = truncated_tool_content(&result, self.config.tool_output_limit);
                messages.push(Message::tool(&tool_call.id, &tool_call.name, content));
            }
        }

        let content = format!("Task couldn't be completed after {max_steps} steps.");
        warn!(agent = %self.name, max_steps, "agent exhausted step budget");
        let completion = StepEvent::Completion {
            reason: CompletionReason::MaxStepsReached,
            content: content.clone(),
        };
        logger
            .log(LogEventKind::Completion, serde_json::json!({"reason": "max_steps_reached"}))
            .await?;
        logger.finalize(max_steps, false).await?;
        events.push(completion);
        Ok(RunOutcome {
            content,
            reason: CompletionReason::MaxStepsReached,
            steps: max_steps,
            events,
            messages,
        })
    }

    /// Streaming variant: same algorithm, but intermediate deltas are
    /// pushed onto the returned stream as they happen. Kept as a distinct
    /// implementation (rather than an adapter over `run`) so content/
    /// reasoning deltas reach the caller incrementally instead of only at
    /// the end of each step.
    pub fn run_stream(
        self: Arc<Self>,
        task: String,
        history: Vec<Message>,
        logger: Arc<RunLogger>,
    ) -> ReceiverStream<Result<StepEvent>> {
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            if let Err(error) = self.run_stream_inner(task, history, logger, tx.clone()).await {
                let _ = tx.send(Err(error)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    async fn run_stream_inner(
        &self,
        task: String,
        history: Vec<Message>,
        logger: Arc<RunLogger>,
        tx: tokio::sync::mpsc::Sender<Result<StepEvent>>,
    ) -> Result<()> {
        use futures::StreamExt;

        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(history);
        messages.push(Message::user(task.clone()));

        logger
            .log(LogEventKind::RunStart, serde_json::json!({"agent": self.name, "task": task}))
            .await?;

        let max_steps = self.config.max_steps.max(1);

        for step in 1..=max_steps {
            let outcome = self
                .token_manager
                .maybe_compress(messages, self.llm.as_ref(), &self.config.model)
                .await?;
            messages = outcome.messages;
            if outcome.compressed {
                let _ = tx
                    .send(Ok(StepEvent::HistoryCompressed {
                        estimated_tokens_after: outcome.estimated_tokens,
                    }))
                    .await;
            }

            let _ = tx
                .send(Ok(StepEvent::Step {
                    step,
                    max_steps,
                    estimated_tokens: outcome.estimated_tokens,
                }))
                .await;

            let mut stream = match self.llm.chat_completion_stream(&messages, &self.call_config()).await {
                Ok(stream) => stream,
                Err(error) => {
                    let content = format!("LLM call failed: {error}");
                    let _ = tx
                        .send(Ok(StepEvent::Completion {
                            reason: CompletionReason::LlmError,
                            content,
                        }))
                        .await;
                    logger.finalize(step, false).await?;
                    return Ok(());
                }
            };

            let mut response = LlmResponse::default();
            while let Some(event) = stream.next().await {
                match event? {
                    crate::llm::LlmStreamEvent::ReasoningDelta(delta) => {
                        response.reasoning.get_or_insert_with(String::new).push_str(&delta);
                        let _ = tx.send(Ok(StepEvent::ThinkingDelta { delta })).await;
                    }
                    crate::llm::LlmStreamEvent::TextDelta(delta) => {
                        response.content.push_str(&delta);
                        let _ = tx.send(Ok(StepEvent::ContentDelta { delta })).await;
                    }
                    crate::llm::LlmStreamEvent::ToolCalls(calls) => {
                        for call in &calls {
                            let _ = tx
                                .send(Ok(StepEvent::ToolCallEvent {
                                    tool_call: call.clone(),
                                }))
                                .await;
                        }
                        response.tool_calls = Some(calls);
                    }
                    crate::llm::LlmStreamEvent::Done(meta) => response.metadata = meta,
                }
            }

            let tool_calls = response.tool_calls.clone().unwrap_or_default();
            messages.push(assistant_message(&response));

            if tool_calls.is_empty() {
                let _ = tx
                    .send(Ok(StepEvent::Completion {
                        reason: CompletionReason::TaskCompleted,
                        content: response.content,
                    }))
                    .await;
                logger.finalize(step, true).await?;
                return Ok(());
            }

            for tool_call in &tool_calls {
                let (result, elapsed) = self.dispatch_tool_call(tool_call).await;
                let _ = tx
                    .send(Ok(StepEvent::ToolResultEvent {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        result: result.clone(),
                        elapsed_ms: elapsed.as_millis() as u64,
                    }))
                    .await;

                let content = truncated_tool_content(&result, self.config.tool_output_limit);
                messages.push(Message::tool(&tool_call.id, &tool_call.name, content));
            }
        }

        let content = format!("Task couldn't be completed after {max_steps} steps.");
        let _ = tx
            .send(Ok(StepEvent::Completion {
                reason: CompletionReason::MaxStepsReached,
                content,
            }))
            .await;
        logger.finalize(max_steps, false).await?;
        Ok(())
    }

    /// Execute one tool call under a wall-clock timer. A timeout or an
    /// unregistered tool both become a `ToolResult::failure` fed back to
    /// the LLM, never a fatal error.
    async fn dispatch_tool_call(&self, tool_call: &ToolCall) -> (ToolResult, Duration) {
        match tokio::time::timeout(DEFAULT_TOOL_TIMEOUT, self.tools.execute(tool_call)).await {
            Ok(Ok((result, elapsed))) => (result, elapsed),
            Ok(Err(error)) => (ToolResult::failure(&tool_call.id, error.to_string()), Duration::default()),
            Err(_) => {
                warn!(tool = %tool_call.name, "tool execution timed out");
                (
                    ToolResult::failure(
                        &tool_call.id,
                        format!("Tool '{}' timed out after {DEFAULT_TOOL_TIMEOUT:?}", tool_call.name),
                    ),
                    DEFAULT_TOOL_TIMEOUT,
                )
            }
        }
    }
}

fn assistant_message(response: &LlmResponse) -> Message {
    let mut message = Message::assistant(response.content.clone());
    message.reasoning = response.reasoning.clone();
    if let Some(calls) = &response.tool_calls {
        if !calls.is_empty() {
            message.tool_calls = Some(calls.clone());
        }
    }
    message
}

fn truncated_tool_content(result: &ToolResult, limit: usize) -> String {
    let text = if result.success {
        result.content.clone().unwrap_or_default()
    } else {
        result.error.clone().unwrap_or_default()
    };

    if text.chars().count() <= limit {
        return text;
    }

    let head: String = text.chars().take(limit).collect();
    format!("{head}\n[... truncated, {} characters total ...]", text.chars().count())
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.config.model)
            .field("tools", &self.tools.tool_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::llm::{LlmCompletionMetadata, LlmResponseStream};
    use crate::message::MessageRole;
    use crate::run_logger::InMemoryRunLogSink;
    use crate::tools::EchoTool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use uuid::Uuid;

    /// Replays a fixed queue of responses, one per call. Lets tests drive
    /// the loop through a known number of steps.
    struct ScriptedProvider {
        responses: Vec<LlmResponse>,
        call_count: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn chat_completion_stream(
            &self,
            _messages: &[Message],
            _config: &LlmCallConfig,
        ) -> Result<LlmResponseStream> {
            unimplemented!("blocking-only tests use chat_completion")
        }

        async fn chat_completion(&self, _messages: &[Message], _config: &LlmCallConfig) -> Result<LlmResponse> {
            let index = self.call_count.fetch_add(1, AtomicOrdering::SeqCst);
            self.responses
                .get(index)
                .cloned()
                .ok_or_else(|| AgentError::llm("no more scripted responses"))
        }
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            content: text.to_string(),
            reasoning: None,
            tool_calls: None,
            metadata: LlmCompletionMetadata::default(),
        }
    }

    fn tool_call_response(tool: &str, args: serde_json::Value) -> LlmResponse {
        LlmResponse {
            content: String::new(),
            reasoning: None,
            tool_calls: Some(vec![ToolCall {
                id: "call_1".into(),
                name: tool.into(),
                arguments: args,
            }]),
            metadata: LlmCompletionMetadata::default(),
        }
    }

    #[tokio::test]
    async fn terminal_response_completes_in_one_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("all done")]));
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let agent = Agent::new("test", AgentConfig::default(), tools, provider);
        let logger = RunLogger::new(Uuid::now_v7(), Arc::new(InMemoryRunLogSink::new()));

        let outcome = agent.run("hello", vec![], &logger).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.content, "all done");
        assert_eq!(outcome.steps, 1);
    }

    #[tokio::test]
    async fn tool_call_is_dispatched_then_loop_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("echo", serde_json::json!({"message": "hi"})),
            text_response("final answer"),
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let agent = Agent::new("test", AgentConfig::default(), tools, provider);
        let logger = RunLogger::new(Uuid::now_v7(), Arc::new(InMemoryRunLogSink::new()));

        let outcome = agent.run("do it", vec![], &logger).await.unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.steps, 2);

        let tool_message = outcome
            .messages
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_message.content, "hi");
    }

    #[tokio::test]
    async fn max_steps_one_with_tool_call_model_stops_after_one_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_call_response(
            "echo",
            serde_json::json!({"message": "loop forever"}),
        )]));
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        let config = AgentConfig::builder().max_steps(1).build();
        let agent = Agent::new("test", config, tools, provider);
        let logger = RunLogger::new(Uuid::now_v7(), Arc::new(InMemoryRunLogSink::new()));

        let outcome = agent.run("loop", vec![], &logger).await.unwrap();
        assert_eq!(outcome.reason, CompletionReason::MaxStepsReached);
        assert_eq!(outcome.steps, 1);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn unknown_tool_becomes_tool_message_not_fatal_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response("does_not_exist", serde_json::json!({})),
            text_response("recovered"),
        ]));
        let agent = Agent::new("test", AgentConfig::default(), ToolRegistry::new(), provider);
        let logger = RunLogger::new(Uuid::now_v7(), Arc::new(InMemoryRunLogSink::new()));

        let outcome = agent.run("task", vec![], &logger).await.unwrap();
        assert!(outcome.success());
        let tool_message = outcome.messages.iter().find(|m| m.role == MessageRole::Tool).unwrap();
        assert!(tool_message.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn llm_failure_produces_sentinel_and_failed_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agent = Agent::new("test", AgentConfig::default(), ToolRegistry::new(), provider);
        let logger = RunLogger::new(Uuid::now_v7(), Arc::new(InMemoryRunLogSink::new()));

        let outcome = agent.run("task", vec![], &logger).await.unwrap();
        assert_eq!(outcome.reason, CompletionReason::LlmError);
        assert!(outcome.content.starts_with("LLM call failed:"));
    }

    #[tokio::test]
    async fn workspace_footer_is_idempotent() {
        let config = AgentConfig::builder()
            .system_prompt(format!("Custom prompt.\n\n{WORKSPACE_FOOTER_PREFIX} /already/here"))
            .workspace_dir("/already/here")
            .build();
        let agent = Agent::new("test", config, ToolRegistry::new(), Arc::new(ScriptedProvider::new(vec![])));

        let prompt = agent.system_prompt();
        assert_eq!(prompt.matches(WORKSPACE_FOOTER_PREFIX).count(), 1);
    }
}

// Agent orchestration core.
//
// An LLM agent is driven through a tool-calling step loop (`agent`); teams of
// specialized agents delegate via a dynamically-built tool (`team`); any
// agent can spawn a depth-bounded sub-agent (`spawn`); conversation state is
// recorded and replayed through a pluggable session backend (`session`),
// with context-window discipline handled by `token_manager`. Every run's
// events are additionally recorded on a structured, replayable tape
// (`run_logger`), distinct from the `tracing` diagnostic logs emitted
// alongside it.
//
// Nothing here depends on a transport (HTTP/SSE), a specific LLM wire
// format, or a specific storage engine -- those are implemented against the
// `LlmProvider`, `SessionManager`, and `RunLogSink` traits in downstream
// crates.

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod message;
pub mod run_logger;
pub mod session;
pub mod spawn;
pub mod team;
pub mod token_manager;
pub mod tool_types;
pub mod tools;

pub use agent::Agent;
pub use config::{AgentConfig, AgentConfigBuilder};
pub use error::{AgentError, Result};
pub use events::{CompletionReason, RunOutcome, StepEvent};
pub use llm::{LlmCallConfig, LlmCompletionMetadata, LlmProvider, LlmResponse, LlmResponseStream, LlmStreamEvent};
pub use message::{Message, MessageRole};
pub use run_logger::{
    FileRunLogSink, InMemoryRunLogSink, LogEventKind, NoOpRunLogSink, RunLogEvent, RunLogSink, RunLogSummary,
    RunLogger,
};
pub use session::{
    FileSessionManager, InMemorySessionManager, RunRecord, RunnerType, Session, SessionManager, SharedSessionManager,
};
pub use spawn::SpawnAgentTool;
pub use team::{DependencyRunResult, Team, TeamConfig, TeamMemberConfig, TeamRunOutcome, TaskOutcome, TaskWithDependencies};
pub use token_manager::{CharTokenEstimator, TokenEstimator, TokenManager, CORE_MEMORY_MARKER};
pub use tool_types::{ToolCall, ToolDefinition, ToolPolicy, ToolResult};
pub use tools::{EchoTool, FailingTool, Tool, ToolExecutionResult, ToolRegistry};

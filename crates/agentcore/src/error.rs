// Error types for agent execution.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur during agent, team, or tool execution.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The LLM transport call failed (after retries). Surfaced to the loop
    /// as the `"LLM call failed: {0}"` sentinel rather than propagated, so
    /// this variant is mostly used by callers that need the LLM provider
    /// to fail the request outright (e.g. bad configuration).
    #[error("LLM call failed: {0}")]
    Llm(String),

    /// A tool call named a tool that isn't registered.
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// Tool execution raised an unexpected internal error.
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Session persistence error.
    #[error("Session store error: {0}")]
    Session(String),

    /// Run-log persistence error.
    #[error("Run log error: {0}")]
    RunLog(String),

    /// Configuration error (invalid or missing required fields).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The agent exhausted its step budget without reaching a terminal
    /// response.
    #[error("Task couldn't be completed after {0} steps.")]
    MaxStepsReached(usize),

    /// A sub-agent spawn was attempted past the configured nesting depth.
    #[error("Maximum agent nesting depth ({0}) reached. Cannot spawn more sub-agents. Consider completing the task with available tools instead.")]
    DepthExceeded(usize),

    /// The team's task dependency graph is invalid.
    #[error("Dependency graph error: {0}")]
    DependencyGraph(String),

    /// History compression (core-memory extraction) failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Execution was cancelled.
    #[error("Execution cancelled")]
    Cancelled,

    /// Catch-all for errors bubbled up from dependencies.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    pub fn llm(msg: impl Into<String>) -> Self {
        AgentError::Llm(msg.into())
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        AgentError::ToolNotFound(name.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        AgentError::ToolExecution(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        AgentError::Session(msg.into())
    }

    pub fn run_log(msg: impl Into<String>) -> Self {
        AgentError::RunLog(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }

    pub fn dependency_graph(msg: impl Into<String>) -> Self {
        AgentError::DependencyGraph(msg.into())
    }

    pub fn compression(msg: impl Into<String>) -> Self {
        AgentError::Compression(msg.into())
    }
}

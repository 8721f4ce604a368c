// Events surfaced by the agent step loop: both the blocking-call summary
// events and the fine-grained deltas emitted by the streaming variant.

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::tool_types::{ToolCall, ToolResult};

/// Why a run's step loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The LLM produced a terminal (no-tool-call) response.
    TaskCompleted,
    /// The step budget was exhausted without a terminal response. Not an
    /// error: a normal completion with a distinct reason code.
    MaxStepsReached,
    /// The LLM call itself failed (network/auth/quota/malformed response).
    LlmError,
    /// The run was cancelled by the caller.
    Cancelled,
}

/// High-level events emitted during a step loop run, consumed both by the
/// blocking `run()` (as a returned event log) and by `run_stream()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    /// Start of iteration `step` (1-indexed), before the LLM call.
    Step {
        step: usize,
        max_steps: usize,
        estimated_tokens: usize,
    },
    /// Incremental reasoning/thinking text (streaming only).
    ThinkingDelta { delta: String },
    /// Incremental assistant content (streaming only).
    ContentDelta { delta: String },
    /// A tool-use block completed and its arguments parsed.
    ToolCallEvent { tool_call: ToolCall },
    /// A tool finished executing.
    ToolResultEvent {
        tool_call_id: String,
        tool_name: String,
        result: ToolResult,
        elapsed_ms: u64,
    },
    /// History was compressed before this step's LLM call.
    HistoryCompressed { estimated_tokens_after: usize },
    /// The run reached a terminal state.
    Completion {
        reason: CompletionReason,
        content: String,
    },
    /// Catch-all for auxiliary, sink-specific events.
    Event { payload: serde_json::Value },
}

/// The full outcome of a blocking `run()` call: the final text plus the
/// ordered event log and the assistant/tool messages appended along the way.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub content: String,
    pub reason: CompletionReason,
    pub steps: usize,
    pub events: Vec<StepEvent>,
    pub messages: Vec<Message>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        matches!(self.reason, CompletionReason::TaskCompleted)
    }
}

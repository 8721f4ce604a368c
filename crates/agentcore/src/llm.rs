// Provider-agnostic LLM call shapes.
//
// `LlmProvider` is the seam every concrete backend (OpenAI-compatible,
// Anthropic Messages API, a scripted mock) implements. The agent loop talks
// to providers exclusively through this trait so it never depends on a
// specific wire format.

use async_trait::async_trait;
use std::pin::Pin;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::message::Message;
use crate::tool_types::{ToolCall, ToolDefinition};

/// Stream of incremental events produced while a completion is generated.
pub type LlmResponseStream = Pin<Box<dyn futures::Stream<Item = Result<LlmStreamEvent>> + Send>>;

/// Events emitted while streaming a completion.
#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    /// Incremental reasoning/thinking text, when the provider surfaces it.
    ReasoningDelta(String),
    /// Incremental assistant content.
    TextDelta(String),
    /// Finalized tool calls (only known once the block closes, since
    /// arguments arrive fragmented across multiple deltas).
    ToolCalls(Vec<ToolCall>),
    /// Streaming completed normally.
    Done(LlmCompletionMetadata),
}

/// Metadata about a completed LLM call.
#[derive(Debug, Clone, Default)]
pub struct LlmCompletionMetadata {
    pub total_tokens: Option<u32>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

/// Configuration for a single LLM call, derived from `AgentConfig`.
#[derive(Debug, Clone)]
pub struct LlmCallConfig {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tools: Vec<ToolDefinition>,
}

impl From<&AgentConfig> for LlmCallConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tools: config.tools.clone(),
        }
    }
}

/// Non-streaming result of an LLM call, as consumed by the agent loop.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub reasoning: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub metadata: LlmCompletionMetadata,
}

/// Trait implemented by every LLM backend.
///
/// Implementations handle provider-specific request construction, SSE
/// parsing, and tool-call argument reassembly; the agent loop only ever
/// sees `Message`/`LlmResponse`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Call the LLM with a streaming response.
    async fn chat_completion_stream(
        &self,
        messages: &[Message],
        config: &LlmCallConfig,
    ) -> Result<LlmResponseStream>;

    /// Call the LLM and collect the full response.
    ///
    /// The default implementation drains `chat_completion_stream`; providers
    /// that don't support streaming can override this directly instead.
    async fn chat_completion(
        &self,
        messages: &[Message],
        config: &LlmCallConfig,
    ) -> Result<LlmResponse> {
        use futures::StreamExt;

        let mut stream = self.chat_completion_stream(messages, config).await?;
        let mut response = LlmResponse::default();

        while let Some(event) = stream.next().await {
            match event? {
                LlmStreamEvent::ReasoningDelta(delta) => {
                    response.reasoning.get_or_insert_with(String::new).push_str(&delta);
                }
                LlmStreamEvent::TextDelta(delta) => response.content.push_str(&delta),
                LlmStreamEvent::ToolCalls(calls) => response.tool_calls = Some(calls),
                LlmStreamEvent::Done(meta) => response.metadata = meta,
            }
        }

        Ok(response)
    }
}

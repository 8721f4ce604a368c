// Token estimation and history compression ("core memory" extraction).
//
// The step loop calls `TokenManager::maybe_compress` before every LLM
// request. Compression folds the conversation prefix between the system
// prompt and the last user turn into a short summary, issued via a side LLM
// call, so long-running sessions don't blow the context window.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::llm::{LlmCallConfig, LlmProvider};
use crate::message::{Message, MessageRole};

/// Marker prefix identifying an injected core-memory summary, so callers
/// (and tests) can recognize compressed history at a glance.
pub const CORE_MEMORY_MARKER: &str = "[conversation history core memory]";

const EXTRACTION_SYSTEM_PROMPT: &str = "You compress conversation history into a compact \
core memory. Summarize the user's intent, key facts established, actions already \
completed, and any pending items. Be concrete and dense. Respond with the summary only, \
no preamble, in no more than 300 words.";

/// Estimates the token cost of a message list. The exact tokenizer is not
/// normative (see spec open questions) but whichever one is chosen must be
/// reused for every threshold decision in a process, to avoid oscillation
/// between "compress" and "don't compress" on successive turns.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text(&self, text: &str) -> usize;

    /// Per-message protocol overhead (role framing, delimiters), added on
    /// top of the content estimate for every message in the list.
    fn message_overhead(&self) -> usize {
        4
    }

    fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .sum::<usize>()
    }

    fn estimate_message(&self, message: &Message) -> usize {
        let mut total = self.message_overhead();
        total += self.estimate_text(&message.content);
        if let Some(reasoning) = &message.reasoning {
            total += self.estimate_text(reasoning);
        }
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                total += self.estimate_text(&call.name);
                total += self.estimate_text(&call.arguments.to_string());
            }
        }
        total
    }
}

/// Character-based fallback estimator (~2.5 chars/token), used when no
/// byte-pair-encoding tokenizer is wired in. Good enough to drive
/// compression trigger decisions; not meant to match a provider's billed
/// token count exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenEstimator;

impl TokenEstimator for CharTokenEstimator {
    fn estimate_text(&self, text: &str) -> usize {
        ((text.chars().count() as f64) / 2.5).ceil() as usize
    }
}

/// Drives the compression trigger and strategy described in the spec.
pub struct TokenManager {
    estimator: Arc<dyn TokenEstimator>,
    enabled: bool,
    token_limit: usize,
    summarize_after_rounds: usize,
}

/// Outcome of a `maybe_compress` call, distinguishing "nothing to do" from
/// an actual rewrite, so callers can log/emit events accordingly.
pub struct CompressionOutcome {
    pub messages: Vec<Message>,
    pub compressed: bool,
    pub estimated_tokens: usize,
}

impl TokenManager {
    pub fn new(token_limit: usize, summarize_after_rounds: usize) -> Self {
        Self {
            estimator: Arc::new(CharTokenEstimator),
            enabled: true,
            token_limit,
            summarize_after_rounds,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn estimate(&self, messages: &[Message]) -> usize {
        self.estimator.estimate_messages(messages)
    }

    fn user_turn_count(messages: &[Message]) -> usize {
        messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count()
    }

    fn should_compress(&self, messages: &[Message]) -> bool {
        if !self.enabled {
            return false;
        }
        Self::user_turn_count(messages) > self.summarize_after_rounds
            || self.estimate(messages) > self.token_limit
    }

    /// Compress `messages` if over threshold; otherwise return them
    /// unchanged (idempotent when under threshold). The system prompt
    /// (index 0) and the final user turn are always preserved verbatim.
    pub async fn maybe_compress(
        &self,
        messages: Vec<Message>,
        llm: &dyn LlmProvider,
        model: &str,
    ) -> Result<CompressionOutcome> {
        let estimated_tokens = self.estimate(&messages);

        if messages.len() < 3 || !self.should_compress(&messages) {
            return Ok(CompressionOutcome {
                messages,
                compressed: false,
                estimated_tokens,
            });
        }

        let Some(k) = messages.iter().rposition(|m| m.role == MessageRole::User) else {
            return Ok(CompressionOutcome {
                messages,
                compressed: false,
                estimated_tokens,
            });
        };

        // Window is everything after the system prompt and before the last
        // user turn. If there's nothing there (k <= 1), there's nothing to
        // fold into a summary.
        if k <= 1 {
            return Ok(CompressionOutcome {
                messages,
                compressed: false,
                estimated_tokens,
            });
        }

        let window = &messages[1..k];
        let summary = self.extract_core_memory(window, llm, model).await;

        let mut compressed = Vec::with_capacity(messages.len() - window.len() + 2);
        compressed.push(messages[0].clone());
        compressed.push(Message::user(format!("{CORE_MEMORY_MARKER}\n{summary}")));
        compressed.push(Message::assistant(
            "Understood. I'll keep that context in mind going forward.",
        ));
        compressed.extend_from_slice(&messages[k..]);

        let new_estimate = self.estimate(&compressed);
        Ok(CompressionOutcome {
            messages: compressed,
            compressed: true,
            estimated_tokens: new_estimate,
        })
    }

    async fn extract_core_memory(
        &self,
        window: &[Message],
        llm: &dyn LlmProvider,
        model: &str,
    ) -> String {
        let transcript = render_transcript(window);
        let extraction_messages = vec![
            Message::system(EXTRACTION_SYSTEM_PROMPT),
            Message::user(transcript),
        ];
        let config = LlmCallConfig {
            model: model.to_string(),
            temperature: Some(0.0),
            max_tokens: Some(512),
            tools: Vec::new(),
        };

        match llm.chat_completion(&extraction_messages, &config).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => {
                warn!("core memory extraction returned empty content; using sentinel summary");
                sentinel_summary(window.len())
            }
            Err(error) => {
                warn!(%error, "core memory extraction failed; using sentinel summary");
                sentinel_summary(window.len())
            }
        }
    }
}

fn sentinel_summary(compressed_message_count: usize) -> String {
    // Rounds, not raw messages, is the user-facing unit; two messages
    // (user + assistant) make up one round in the common case.
    let rounds = compressed_message_count.div_ceil(2);
    format!("[{rounds} rounds compressed, extraction failed]")
}

fn render_transcript(window: &[Message]) -> String {
    let mut out = String::new();
    for message in window {
        match message.role {
            MessageRole::System => continue,
            MessageRole::User => out.push_str(&format!("User: {}\n", message.content)),
            MessageRole::Assistant => {
                out.push_str(&format!("Assistant: {}\n", message.content));
                if let Some(calls) = &message.tool_calls {
                    for call in calls {
                        out.push_str(&format!("  (called tool {})\n", call.name));
                    }
                }
            }
            MessageRole::Tool => out.push_str(&format!(
                "Tool[{}]: {}\n",
                message.tool_name.as_deref().unwrap_or("?"),
                message.content
            )),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmCompletionMetadata, LlmResponse};
    use async_trait::async_trait;

    struct StubProvider(Option<String>);

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat_completion_stream(
            &self,
            _messages: &[Message],
            _config: &LlmCallConfig,
        ) -> Result<crate::llm::LlmResponseStream> {
            unimplemented!("not used by these tests")
        }

        async fn chat_completion(
            &self,
            _messages: &[Message],
            _config: &LlmCallConfig,
        ) -> Result<LlmResponse> {
            match &self.0 {
                Some(text) => Ok(LlmResponse {
                    content: text.clone(),
                    reasoning: None,
                    tool_calls: None,
                    metadata: LlmCompletionMetadata::default(),
                }),
                None => Err(crate::error::AgentError::llm("extraction backend down")),
            }
        }
    }

    #[tokio::test]
    async fn under_threshold_returns_unchanged() {
        let manager = TokenManager::new(120_000, 2);
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let provider = StubProvider(Some("summary".into()));

        let outcome = manager
            .maybe_compress(messages.clone(), &provider, "gpt-4o")
            .await
            .unwrap();

        assert!(!outcome.compressed);
        assert_eq!(outcome.messages.len(), messages.len());
    }

    #[tokio::test]
    async fn compresses_after_exceeding_round_threshold() {
        let manager = TokenManager::new(120_000, 1);
        let messages = vec![
            Message::system("sys"),
            Message::user("round 1"),
            Message::assistant("reply 1"),
            Message::user("round 2"),
            Message::assistant("reply 2"),
            Message::user("round 3"),
        ];
        let provider = StubProvider(Some("user wants X, did Y, pending Z".into()));

        let outcome = manager
            .maybe_compress(messages, &provider, "gpt-4o")
            .await
            .unwrap();

        assert!(outcome.compressed);
        assert_eq!(outcome.messages[0].role, MessageRole::System);
        assert!(outcome.messages[1].content.starts_with(CORE_MEMORY_MARKER));
        assert_eq!(outcome.messages[2].role, MessageRole::Assistant);
        assert_eq!(outcome.messages.last().unwrap().content, "round 3");
    }

    #[tokio::test]
    async fn extraction_failure_substitutes_sentinel() {
        let manager = TokenManager::new(120_000, 1);
        let messages = vec![
            Message::system("sys"),
            Message::user("round 1"),
            Message::assistant("reply 1"),
            Message::user("round 2"),
        ];
        let provider = StubProvider(None);

        let outcome = manager
            .maybe_compress(messages, &provider, "gpt-4o")
            .await
            .unwrap();

        assert!(outcome.compressed);
        assert!(outcome.messages[1].content.contains("extraction failed"));
    }

    #[test]
    fn char_estimator_is_monotonic_in_length() {
        let estimator = CharTokenEstimator;
        let short = estimator.estimate_text("hi");
        let long = estimator.estimate_text(&"hi ".repeat(100));
        assert!(long > short);
    }
}

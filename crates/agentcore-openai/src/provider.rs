// OpenAI-compatible chat completions provider.
//
// Implements `agentcore::LlmProvider` against any endpoint that speaks the
// OpenAI chat completions wire format (OpenAI itself, Azure OpenAI, local
// inference servers fronting the same protocol).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;

use agentcore::error::{AgentError, Result};
use agentcore::llm::{LlmCallConfig, LlmCompletionMetadata, LlmProvider, LlmResponseStream, LlmStreamEvent};
use agentcore::message::Message;

use crate::retry::RetryPolicy;
use crate::types::{
    clamp_max_tokens, convert_message, convert_tools, finalize_tool_calls, OpenAiRequest, OpenAiStreamChunk,
    PendingToolCall,
};

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// LLM provider speaking the OpenAI chat completions protocol.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::llm("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self::new(api_key))
    }

    /// Point at an OpenAI-compatible endpoint other than OpenAI itself.
    pub fn with_base_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Send the chat completions request, retrying transient network and
    /// server-side failures with exponential backoff. A successful send that
    /// comes back with a client error status (4xx other than 429) is not
    /// retried, since resending the same request won't change the outcome.
    async fn send_with_retry(&self, request: &OpenAiRequest) -> Result<reqwest::Response> {
        let policy = RetryPolicy::default();
        let mut attempt = 1;

        loop {
            let outcome = self
                .client
                .post(&self.api_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(request)
                .send()
                .await;

            let retryable_error = match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        let body = response.text().await.unwrap_or_default();
                        Some(format!("OpenAI API error ({status}): {body}"))
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(AgentError::llm(format!("OpenAI API error ({status}): {body}")));
                    }
                }
                Err(e) => Some(format!("failed to send request: {e}")),
            };

            let message = retryable_error.expect("loop only continues on a retryable error");
            if !policy.has_attempts_remaining(attempt) {
                return Err(AgentError::llm(format!(
                    "{message} (gave up after {attempt} attempts)"
                )));
            }

            let delay = policy.delay_for_attempt(attempt);
            tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying OpenAI request: {message}");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat_completion_stream(&self, messages: &[Message], config: &LlmCallConfig) -> Result<LlmResponseStream> {
        let request = OpenAiRequest {
            model: config.model.clone(),
            messages: messages.iter().map(convert_message).collect(),
            temperature: config.temperature,
            max_tokens: clamp_max_tokens(&config.model, config.max_tokens),
            stream: true,
            tools: if config.tools.is_empty() {
                None
            } else {
                Some(convert_tools(&config.tools))
            },
        };

        let response = self.send_with_retry(&request).await?;

        let model = config.model.clone();
        let event_stream = response.bytes_stream().eventsource();
        let pending_calls = Arc::new(Mutex::new(HashMap::<usize, PendingToolCall>::new()));
        let total_tokens = Arc::new(Mutex::new(0u32));

        let stream = event_stream.filter_map(move |result| {
            let model = model.clone();
            let pending_calls = Arc::clone(&pending_calls);
            let total_tokens = Arc::clone(&total_tokens);

            async move {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => return Some(Err(AgentError::llm(format!("stream error: {e}")))),
                };

                if event.data == "[DONE]" {
                    return None;
                }

                let chunk: OpenAiStreamChunk = match serde_json::from_str(&event.data) {
                    Ok(chunk) => chunk,
                    Err(e) => return Some(Err(AgentError::llm(format!("failed to parse stream chunk: {e}")))),
                };

                let choice = chunk.choices.into_iter().next()?;

                if let Some(tool_calls) = choice.delta.tool_calls {
                    let mut pending = pending_calls.lock().unwrap();
                    for delta in tool_calls {
                        let entry = pending.entry(delta.index).or_default();
                        if let Some(id) = delta.id {
                            entry.id = id;
                        }
                        if let Some(function) = delta.function {
                            if let Some(name) = function.name {
                                entry.name = name;
                            }
                            if let Some(args) = function.arguments {
                                entry.arguments.push_str(&args);
                            }
                        }
                    }
                    return None;
                }

                if let Some(reasoning) = choice.delta.reasoning_content {
                    if !reasoning.is_empty() {
                        return Some(Ok(LlmStreamEvent::ReasoningDelta(reasoning)));
                    }
                }

                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        *total_tokens.lock().unwrap() += 1;
                        return Some(Ok(LlmStreamEvent::TextDelta(content)));
                    }
                }

                if let Some(finish_reason) = choice.finish_reason {
                    if finish_reason == "tool_calls" {
                        let mut pending = pending_calls.lock().unwrap();
                        let mut ordered: Vec<(usize, PendingToolCall)> = pending.drain().collect();
                        ordered.sort_by_key(|(index, _)| *index);
                        let calls = finalize_tool_calls(ordered.into_iter().map(|(_, call)| call).collect());
                        if !calls.is_empty() {
                            return Some(Ok(LlmStreamEvent::ToolCalls(calls)));
                        }
                    }

                    let tokens = *total_tokens.lock().unwrap();
                    return Some(Ok(LlmStreamEvent::Done(LlmCompletionMetadata {
                        total_tokens: Some(tokens),
                        prompt_tokens: None,
                        completion_tokens: Some(tokens),
                        model: Some(model.clone()),
                        finish_reason: Some(finish_reason),
                    })));
                }

                None
            }
        });

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_api_key_in_debug() {
        let provider = OpenAiProvider::new("sk-secret-value");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("sk-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn custom_base_url_is_used() {
        let provider = OpenAiProvider::with_base_url("key", "https://example.com/v1/chat/completions");
        assert_eq!(provider.api_url(), "https://example.com/v1/chat/completions");
    }
}

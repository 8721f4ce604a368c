// Agent configuration.
//
// AgentConfig is backend-agnostic: it can be built directly for standalone
// use, or via the builder for fluent assembly alongside a ToolRegistry.

use serde::{Deserialize, Serialize};

use crate::tool_types::ToolDefinition;

fn default_max_steps() -> usize {
    50
}

fn default_token_limit() -> usize {
    120_000
}

fn default_summarize_after_rounds() -> usize {
    2
}

fn default_tool_output_limit() -> usize {
    10_000
}

fn default_workspace_dir() -> String {
    "./workspace".to_string()
}

/// Configuration for a single agent's step loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// System prompt defining the agent's behavior. The workspace footer is
    /// appended at assembly time, not stored here.
    pub system_prompt: String,

    /// Model identifier (e.g. "gpt-4o", "claude-sonnet-4").
    pub model: String,

    /// Tool schemas to advertise to the LLM.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Maximum step-loop iterations before a non-fatal max_steps completion.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Sampling temperature (0.0-2.0), provider-dependent.
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per LLM response.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Token budget before TokenManager compresses history.
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Whether history compression is enabled at all.
    #[serde(default = "default_true")]
    pub enable_summarization: bool,

    /// Compress once more than this many user turns have accumulated.
    #[serde(default = "default_summarize_after_rounds")]
    pub summarize_after_rounds: usize,

    /// Truncate tool output beyond this many characters before it's
    /// appended to history.
    #[serde(default = "default_tool_output_limit")]
    pub tool_output_limit: usize,

    /// Workspace root the agent operates in; surfaced as a system-prompt
    /// footer and passed to filesystem-touching tools.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Whether RunLogger events are emitted for this agent's runs.
    #[serde(default = "default_true")]
    pub enable_logging: bool,
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    pub fn new(system_prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::new()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            model: "gpt-4o".to_string(),
            tools: Vec::new(),
            max_steps: default_max_steps(),
            temperature: None,
            max_tokens: None,
            token_limit: default_token_limit(),
            enable_summarization: true,
            summarize_after_rounds: default_summarize_after_rounds(),
            tool_output_limit: default_tool_output_limit(),
            workspace_dir: default_workspace_dir(),
            enable_logging: true,
        }
    }
}

/// Fluent builder for `AgentConfig`.
#[derive(Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.config.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.config.tools.extend(tools);
        self
    }

    pub fn max_steps(mut self, max: usize) -> Self {
        self.config.max_steps = max;
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    pub fn token_limit(mut self, limit: usize) -> Self {
        self.config.token_limit = limit;
        self
    }

    pub fn enable_summarization(mut self, enabled: bool) -> Self {
        self.config.enable_summarization = enabled;
        self
    }

    pub fn summarize_after_rounds(mut self, rounds: usize) -> Self {
        self.config.summarize_after_rounds = rounds;
        self
    }

    pub fn tool_output_limit(mut self, limit: usize) -> Self {
        self.config.tool_output_limit = limit;
        self
    }

    pub fn workspace_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.workspace_dir = dir.into();
        self
    }

    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    pub fn build(self) -> AgentConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AgentConfig::builder()
            .system_prompt("You are a researcher.")
            .model("gpt-4o")
            .max_steps(5)
            .temperature(0.2)
            .build();

        assert_eq!(config.max_steps, 5);
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn defaults_match_spec() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.token_limit, 120_000);
        assert_eq!(config.summarize_after_rounds, 2);
        assert_eq!(config.tool_output_limit, 10_000);
    }
}

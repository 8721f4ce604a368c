// Shared plumbing for building the Agent/LLM/log-sink stack each command
// needs. Kept separate from `main.rs` so each command module can assemble
// exactly the pieces it needs without repeating the wiring.

use std::sync::Arc;

use agentcore::{
    Agent, AgentConfig, EchoTool, FileRunLogSink, LlmProvider, NoOpRunLogSink, RunLogSink, ToolRegistry,
};
use agentcore_openai::OpenAiProvider;
use anyhow::{Context, Result};

use crate::config::AppConfig;

pub fn build_llm() -> Result<Arc<dyn LlmProvider>> {
    if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        Ok(Arc::new(OpenAiProvider::with_base_url(api_key, base_url)))
    } else {
        Ok(Arc::new(OpenAiProvider::from_env().context("failed to construct OpenAI provider")?))
    }
}

pub fn build_log_sink() -> Arc<dyn RunLogSink> {
    match std::env::var("AGENTCORE_RUN_LOG_DIR") {
        Ok(dir) => Arc::new(FileRunLogSink::new(dir)),
        Err(_) => Arc::new(NoOpRunLogSink),
    }
}

/// Tools available to every agent the CLI drives. Tool *loading* (skills,
/// MCP, RAG) is out of scope for this core; the CLI just demonstrates the
/// uniform `Tool` interface with the built-in echo tool.
pub fn build_tools() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(EchoTool);
    tools
}

pub fn build_agent(config: &AppConfig, llm: Arc<dyn LlmProvider>, tools: ToolRegistry) -> Agent {
    let agent_config = AgentConfig::builder()
        .system_prompt("You are a helpful assistant running from the command line.")
        .model(config.model.clone())
        .max_steps(config.max_steps)
        .workspace_dir(config.workspace_dir.clone())
        .build();

    Agent::new("cli-agent", agent_config, tools, llm)
}

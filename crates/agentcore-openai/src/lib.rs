// OpenAI-compatible chat completions provider implementation.
//
// Implements `agentcore::LlmProvider` over OpenAI's chat completions wire
// format (and any OpenAI-compatible endpoint), enabling the agent step loop
// to communicate with OpenAI without the core crate depending on reqwest,
// SSE parsing, or this particular provider's request/response shapes.

mod provider;
mod retry;
mod types;

pub use provider::OpenAiProvider;

//! Model gateway trait — the seam between the agent loop and the backend.
//!
//! `HttpGateway` in `http_gateway.rs` covers any OpenAI-compatible API; tests
//! script their own gateways.

use async_trait::async_trait;
use mcpchat_core::error::BackendError;
use mcpchat_core::types::{Message, ToolCall, ToolDefinition};

/// Sampling parameters passed with each request.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// The one message a backend call yields.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// Final answer; ends the turn.
    Text(String),
    /// Tool invocations, with any text the model emitted alongside.
    ToolRequest {
        calls: Vec<ToolCall>,
        text: Option<String>,
    },
}

impl From<ModelReply> for Message {
    fn from(reply: ModelReply) -> Self {
        match reply {
            ModelReply::Text(text) => Message::AgentText { text },
            ModelReply::ToolRequest { calls, text } => Message::AgentToolRequest { calls, text },
        }
    }
}

/// A language-model backend.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send the full history plus tool schemas, get exactly one reply.
    ///
    /// Never streams. Every failure is a [`BackendError`].
    async fn infer(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, BackendError>;

    /// Model identifier used for requests.
    fn model(&self) -> &str;
}

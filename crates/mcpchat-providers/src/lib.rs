//! Model backend layer for mcpchat.
//!
//! # Architecture
//!
//! - [`traits::ModelGateway`] — trait every backend implements
//! - [`wire`] — OpenAI chat completions wire types and the history mapping
//! - [`http_gateway::HttpGateway`] — OpenAI-compatible HTTP client

pub mod http_gateway;
pub mod traits;
pub mod wire;

// Re-export main types for convenience
pub use http_gateway::HttpGateway;
pub use traits::{LlmRequestConfig, ModelGateway, ModelReply};

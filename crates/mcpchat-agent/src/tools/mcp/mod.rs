//! MCP (Model Context Protocol) clients.
//!
//! - [`stdio::StdioMcpClient`] — child process speaking JSON-RPC on stdin/stdout
//! - [`http::HttpMcpClient`] — streamable HTTP endpoint
//! - [`McpTool`] — adapts one remote tool to the [`Tool`] trait

pub mod http;
pub mod protocol;
pub mod stdio;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use mcpchat_core::config::{McpEndpoint, McpServerSpec};
use mcpchat_core::error::{ConnectionError, ToolError};
use mcpchat_core::types::ToolArguments;

use crate::tools::base::Tool;
pub use http::HttpMcpClient;
pub use protocol::{McpToolDefinition, ToolCallResult};
pub use stdio::StdioMcpClient;

/// A live connection to one MCP server.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Server name from the config document.
    fn server_name(&self) -> &str;

    /// Every tool the server exposes, following pagination.
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// Invoke a tool.
    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<ToolCallResult, McpError>;

    /// Release the connection. Idempotent.
    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server spawn failed: {0}")]
    SpawnFailed(String),

    #[error("timeout waiting for server response")]
    Timeout,
}

impl McpError {
    /// Classify a failure that happened while listing tools.
    pub(crate) fn into_list_error(self, server: &str) -> ConnectionError {
        match self {
            McpError::Protocol(_) | McpError::Json(_) | McpError::Rpc { .. } => {
                ConnectionError::MalformedToolList {
                    server: server.to_string(),
                    reason: self.to_string(),
                }
            }
            other => ConnectionError::Unreachable {
                server: server.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Open a connection to `spec` and complete the initialize handshake.
pub async fn connect(
    spec: &McpServerSpec,
    request_timeout: Duration,
) -> Result<Arc<dyn McpClient>, ConnectionError> {
    let client: Arc<dyn McpClient> = match &spec.endpoint {
        McpEndpoint::Stdio { command, args, env } => {
            let client = StdioMcpClient::spawn(&spec.name, command, args, env, request_timeout)
                .await
                .map_err(|e| match e {
                    McpError::SpawnFailed(reason) => ConnectionError::Spawn {
                        server: spec.name.clone(),
                        reason,
                    },
                    other => ConnectionError::Handshake {
                        server: spec.name.clone(),
                        reason: other.to_string(),
                    },
                })?;
            Arc::new(client)
        }
        McpEndpoint::Http { url, headers } => {
            let client = HttpMcpClient::connect(&spec.name, url, headers, request_timeout)
                .await
                .map_err(|e| match e {
                    McpError::Transport(_) | McpError::Timeout | McpError::Http { .. } => {
                        ConnectionError::Unreachable {
                            server: spec.name.clone(),
                            reason: e.to_string(),
                        }
                    }
                    other => ConnectionError::Handshake {
                        server: spec.name.clone(),
                        reason: other.to_string(),
                    },
                })?;
            Arc::new(client)
        }
    };
    info!(server = %spec.name, "connected to tool server");
    Ok(client)
}

// ─────────────────────────────────────────────
// McpTool
// ─────────────────────────────────────────────

/// One tool exposed by an MCP server.
pub struct McpTool {
    client: Arc<dyn McpClient>,
    definition: McpToolDefinition,
}

impl McpTool {
    pub fn new(client: Arc<dyn McpClient>, definition: McpToolDefinition) -> Self {
        Self { client, definition }
    }

    /// Name of the server providing this tool.
    pub fn server_name(&self) -> &str {
        self.client.server_name()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn parameters(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let result = self
            .client
            .call_tool(&self.definition.name, arguments)
            .await
            .map_err(|e| ToolError::Execution {
                tool: self.definition.name.clone(),
                reason: e.to_string(),
            })?;

        if result.is_error {
            return Err(ToolError::Execution {
                tool: self.definition.name.clone(),
                reason: result.text(),
            });
        }
        Ok(result.text())
    }
}

// ─────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────

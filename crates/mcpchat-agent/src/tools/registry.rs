//! Tool registry — the flat, case-insensitive set of tools for one session.
//!
//! Built once per session by [`ToolRegistry::discover`], which connects to
//! every declared MCP server in declaration order. On a name clash the tool
//! registered first wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use mcpchat_core::config::McpServerSpec;
use mcpchat_core::error::ConnectionError;
use mcpchat_core::types::ToolDefinition;

use super::base::Tool;
use super::mcp::{self, McpClient, McpTool};

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Stores tools keyed by lower-cased name and owns the server connections
/// behind them.
pub struct ToolRegistry {
    /// Registration order.
    tools: Vec<Arc<dyn Tool>>,
    /// Lower-cased name → position in `tools`.
    index: HashMap<String, usize>,
    clients: Vec<Arc<dyn McpClient>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            clients: Vec::new(),
        }
    }

    /// Connect to every server in `servers` and collect their tools.
    ///
    /// All or nothing: if any server fails, connections opened so far are
    /// closed and the error is returned.
    pub async fn discover(
        servers: &[McpServerSpec],
        request_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let mut clients: Vec<Arc<dyn McpClient>> = Vec::with_capacity(servers.len());
        for spec in servers {
            match mcp::connect(spec, request_timeout).await {
                Ok(client) => clients.push(client),
                Err(e) => {
                    warn!(server = %spec.name, error = %e, "tool discovery failed");
                    for client in &clients {
                        client.shutdown().await;
                    }
                    return Err(e);
                }
            }
        }
        Self::from_clients(clients).await
    }

    /// Collect tools from already connected clients, in the given order.
    ///
    /// Takes ownership of the clients; they are shut down on failure.
    pub async fn from_clients(clients: Vec<Arc<dyn McpClient>>) -> Result<Self, ConnectionError> {
        let mut registry = Self::new();
        registry.clients = clients;

        for client in registry.clients.clone() {
            let server = client.server_name().to_string();
            let definitions = match client.list_tools().await {
                Ok(defs) => defs,
                Err(e) => {
                    registry.close().await;
                    return Err(e.into_list_error(&server));
                }
            };
            if let Some(bad) = definitions.iter().find(|d| d.name.trim().is_empty()) {
                registry.close().await;
                return Err(ConnectionError::MalformedToolList {
                    server,
                    reason: format!("tool with empty name (description: {:?})", bad.description),
                });
            }

            let count = definitions.len();
            for def in definitions {
                registry.register(Arc::new(McpTool::new(client.clone(), def)));
            }
            info!(server = %server, tools = count, "discovered tools");
        }

        Ok(registry)
    }

    /// Register a tool. Returns `false` (and keeps the existing one) if a
    /// tool with the same case-insensitive name is already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let key = tool.name().to_lowercase();
        if self.index.contains_key(&key) {
            warn!(tool = tool.name(), "duplicate tool name, keeping the first registration");
            return false;
        }
        debug!(tool = tool.name(), "registered tool");
        self.index.insert(key, self.tools.len());
        self.tools.push(tool);
        true
    }

    /// Look up a tool by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index
            .get(&name.to_lowercase())
            .map(|&position| &self.tools[position])
    }

    /// Check if a tool is registered.
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all registered tools, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Model-facing definitions for all registered tools, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Number of live server connections.
    pub fn server_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop every tool and shut down every server connection.
    pub async fn close(&mut self) {
        self.tools.clear();
        self.index.clear();
        for client in self.clients.drain(..) {
            client.shutdown().await;
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Tool server declarations — the `mcpServers` document.
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "time":   { "command": "uvx", "args": ["mcp-server-time"] },
//!     "search": { "type": "http", "url": "http://localhost:8931/mcp" }
//!   }
//! }
//! ```
//!
//! Declaration order is kept: when two servers expose the same tool name,
//! the server declared first wins.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Raw entry as written in the document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerEntry {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Top-level document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    pub mcp_servers: IndexMap<String, McpServerEntry>,
}

/// How to reach one tool server.
#[derive(Clone, Debug, PartialEq)]
pub enum McpEndpoint {
    /// Child process speaking JSON-RPC over stdin/stdout.
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    /// Streamable HTTP endpoint.
    Http {
        url: String,
        headers: HashMap<String, String>,
    },
}

/// A validated, enabled server declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct McpServerSpec {
    pub name: String,
    pub endpoint: McpEndpoint,
}

impl McpConfig {
    /// Parse and validate a document.
    pub fn from_json_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: serde_json::Value =
            serde_json::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        match raw.get("mcpServers") {
            Some(v) if v.is_object() => {}
            Some(_) => return Err(ConfigError::Invalid("\"mcpServers\" must be an object".into())),
            None => return Err(ConfigError::Invalid("missing \"mcpServers\"".into())),
        }
        let config: McpConfig =
            serde_json::from_value(raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        // Surface bad entries now rather than at connect time.
        config.servers()?;
        Ok(config)
    }

    /// Enabled servers in declaration order.
    pub fn servers(&self) -> Result<Vec<McpServerSpec>, ConfigError> {
        let mut specs = Vec::new();
        for (name, entry) in &self.mcp_servers {
            if entry.enabled == Some(false) {
                debug!(server = %name, "tool server disabled, skipping");
                continue;
            }
            specs.push(McpServerSpec {
                name: name.clone(),
                endpoint: resolve_endpoint(name, entry)?,
            });
        }
        Ok(specs)
    }
}

/// Read and validate the document at `path`.
pub fn load_mcp_config(path: &Path) -> Result<McpConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = McpConfig::from_json_str(&content, path)?;
    debug!(
        path = %path.display(),
        servers = config.mcp_servers.len(),
        "loaded tool server config"
    );
    Ok(config)
}

fn resolve_endpoint(name: &str, entry: &McpServerEntry) -> Result<McpEndpoint, ConfigError> {
    let is_http = match entry.transport.as_deref() {
        Some("stdio") | Some("local") => false,
        Some("http") | Some("streamable-http") | Some("streamable_http") | Some("streamableHttp") => {
            true
        }
        Some(other) => {
            return Err(ConfigError::Invalid(format!(
                "server '{name}': unsupported transport type '{other}'"
            )))
        }
        None => entry.url.is_some(),
    };

    if is_http {
        let url = entry
            .url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid(format!("server '{name}': http transport needs a \"url\"")))?;
        Ok(McpEndpoint::Http {
            url,
            headers: entry.headers.clone(),
        })
    } else {
        let command = entry
            .command
            .clone()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ConfigError::Invalid(format!("server '{name}': stdio transport needs a \"command\"")))?;
        Ok(McpEndpoint::Stdio {
            command,
            args: entry.args.clone(),
            env: entry.env.clone(),
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! Configuration schema.
//!
//! Hierarchy: `Config` → `BackendConfig`, `AgentConfig`, `ToolsConfig`,
//! `StoreConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.mcpchat/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub backend: BackendConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub store: StoreConfig,
}

// ─────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────

/// Model backend connection (any OpenAI-compatible chat completions API).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://openrouter.ai/api/v1`.
    pub api_base: String,
    /// Bearer token.
    pub api_key: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    /// Prepended to every request as a system message; never stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "https://openrouter.ai/api/v1".to_string(),
            api_key: String::new(),
            model: "anthropic/claude-3.7-sonnet".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            extra_headers: None,
            system_prompt: None,
        }
    }
}

impl BackendConfig {
    /// Whether an API key is set.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

// ─────────────────────────────────────────────
// Agent loop
// ─────────────────────────────────────────────

/// Agent loop limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Maximum model ↔ tool rounds per user turn before the turn is cut off.
    pub max_tool_rounds: u32,
    /// Timeout for one model call, in seconds.
    pub backend_timeout_secs: u64,
    /// Timeout for one tool call, in seconds.
    pub tool_timeout_secs: u64,
    /// Timeout for one tool server request during the handshake and tool
    /// listing, in seconds. Tool calls are bounded by `tool_timeout_secs`.
    pub discovery_timeout_secs: u64,
    /// Run the calls of one batch concurrently. Results keep issue order.
    pub parallel_tool_calls: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 20,
            backend_timeout_secs: 120,
            tool_timeout_secs: 60,
            discovery_timeout_secs: 30,
            parallel_tool_calls: false,
        }
    }
}

// ─────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────

/// Where tool servers are declared.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolsConfig {
    /// Path of the `mcpServers` document. Relative paths resolve against
    /// the working directory.
    pub mcp_config_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mcp_config_path: "mcp_config.json".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────

/// Conversation storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per conversation.
    pub directory: String,
    /// Days a saved record lives before the store reclaims it.
    pub ttl_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: "~/.mcpchat/conversations".to_string(),
            ttl_days: crate::store::DEFAULT_TTL_DAYS,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

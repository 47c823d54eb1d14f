//! Configuration system — schema, loading, env var overrides, and the
//! tool server document.
//!
//! # Usage
//! ```no_run
//! use mcpchat_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Model: {}", cfg.backend.model);
//! ```

pub mod loader;
pub mod mcp;
pub mod schema;

// Re-export key types
pub use loader::{get_config_path, load_config, save_config};
pub use mcp::{load_mcp_config, McpConfig, McpEndpoint, McpServerSpec};
pub use schema::{AgentConfig, BackendConfig, Config, StoreConfig, ToolsConfig};

//! mcpchat core — conversation types, errors, configuration, and storage.
//!
//! This crate contains:
//! - **types**: `Message`, `ToolCall`, `ToolResult`, `Conversation`
//! - **error**: the typed error taxonomy shared by every other crate
//! - **config**: `~/.mcpchat/config.json` and the `mcpServers` document
//! - **store**: `ConversationStore` with file and in-memory backends

pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod utils;

pub use error::{BackendError, ConfigError, ConnectionError, PersistenceError, ToolError};
pub use store::{ConversationStore, ConversationSummary, FileConversationStore, MemoryConversationStore};
pub use types::{Conversation, Message, ToolArguments, ToolCall, ToolDefinition, ToolResult};

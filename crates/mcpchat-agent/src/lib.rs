//! mcpchat agent — tool registry, tool execution, sessions, and the agent loop.
//!
//! This crate contains:
//! - **tools**: the `Tool` trait, MCP clients (stdio and HTTP), and the registry
//! - **executor**: runs tool calls and normalizes their outcomes
//! - **session**: the conversation, store, and tools of one chat
//! - **agent_loop**: the model ↔ tool-calling state machine

pub mod agent_loop;
pub mod executor;
pub mod session;
pub mod tools;

pub use agent_loop::{AgentLoop, TurnEvent, TurnOutcome, TurnReport, TurnState};
pub use executor::ToolExecutor;
pub use session::{Session, SessionError};
pub use tools::{McpClient, McpError, Tool, ToolRegistry};

//! Session — the explicit context of one chat: the current conversation, the
//! store it is persisted to, and the tool registry for the session.
//!
//! Tool servers are connected on the first turn that needs them and kept for
//! the rest of the session. A failed connection is retried on the next turn.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use mcpchat_core::config::{load_mcp_config, McpServerSpec};
use mcpchat_core::error::{ConfigError, ConnectionError, PersistenceError};
use mcpchat_core::store::ConversationStore;
use mcpchat_core::types::{Conversation, Message};

use crate::tools::ToolRegistry;

/// Default timeout for a single MCP request during the handshake and tool
/// listing. Tool calls are bounded by the executor instead.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Session start failed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// One interactive chat session.
pub struct Session {
    conversation: Conversation,
    store: Arc<dyn ConversationStore>,
    servers: Vec<McpServerSpec>,
    registry: ToolRegistry,
    connected: bool,
    request_timeout: Duration,
}

impl Session {
    /// Create a session over an in-memory conversation.
    pub fn new(store: Arc<dyn ConversationStore>, servers: Vec<McpServerSpec>, conversation: Conversation) -> Self {
        Self {
            conversation,
            store,
            servers,
            registry: ToolRegistry::new(),
            connected: false,
            request_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Read the tool server document and open a session.
    ///
    /// With `conversation_id`, the stored history of that conversation is
    /// loaded (empty if it never existed or expired); otherwise a new
    /// conversation is started.
    pub fn start(
        store: Arc<dyn ConversationStore>,
        mcp_config_path: &Path,
        conversation_id: Option<&str>,
    ) -> Result<Self, SessionError> {
        let servers = load_mcp_config(mcp_config_path)?.servers()?;
        let mut session = Self::new(store, servers, Conversation::new());
        if let Some(id) = conversation_id {
            session.resume(id)?;
        }
        info!(
            conversation = %session.conversation.id,
            servers = session.servers.len(),
            "session started"
        );
        Ok(session)
    }

    /// Use a ready-made registry instead of discovering tool servers.
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self.connected = true;
        self
    }

    /// Per-request timeout for the handshake and tool listing. It does not
    /// cut off `tools/call`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn id(&self) -> &str {
        &self.conversation.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Declared (enabled) tool servers.
    pub fn servers(&self) -> &[McpServerSpec] {
        &self.servers
    }

    /// The registry, if tools have been connected.
    pub fn registry(&self) -> Option<&ToolRegistry> {
        self.connected.then_some(&self.registry)
    }

    /// Connect to the tool servers unless already connected.
    pub async fn connect_tools(&mut self) -> Result<&ToolRegistry, ConnectionError> {
        if !self.connected {
            self.registry = ToolRegistry::discover(&self.servers, self.request_timeout).await?;
            self.connected = true;
            debug!(tools = self.registry.len(), "tool registry ready");
        }
        Ok(&self.registry)
    }

    /// Split borrows used by the agent loop while a turn runs.
    pub(crate) fn turn_parts(&mut self) -> (&ToolRegistry, &mut Conversation) {
        (&self.registry, &mut self.conversation)
    }

    /// Switch to a fresh conversation. Tool connections are kept.
    pub fn new_conversation(&mut self) {
        self.conversation = Conversation::new();
        info!(conversation = %self.conversation.id, "new conversation");
    }

    /// Switch to a stored conversation.
    pub fn resume(&mut self, id: &str) -> Result<(), PersistenceError> {
        let messages = self.store.load(id)?;
        let mut conversation = Conversation::with_id(id);
        conversation.messages = messages;
        debug!(conversation = id, messages = conversation.messages.len(), "resumed conversation");
        self.conversation = conversation;
        Ok(())
    }

    /// Persist the current history.
    pub fn save(&self) -> Result<(), PersistenceError> {
        self.store.save(&self.conversation.id, &self.conversation.messages)
    }

    /// Release every tool server connection.
    pub async fn close(&mut self) {
        self.registry.close().await;
        self.connected = false;
        debug!(conversation = %self.conversation.id, "session closed");
    }
}

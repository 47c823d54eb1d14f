//! Agent loop — the model ↔ tool-calling state machine.
//!
//! One turn:
//! ```text
//! AwaitingUserInput → Inferring → (DispatchingTools → Inferring)* → Idle
//! ```
//! The turn always ends in `Idle`, and `Idle` always persists the history,
//! whatever happened on the way there.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use mcpchat_core::config::AgentConfig;
use mcpchat_core::error::{BackendError, ConnectionError, PersistenceError};
use mcpchat_core::types::{Conversation, Message, ToolArguments, ToolCall, ToolDefinition, ToolResult};
use mcpchat_providers::traits::{ModelGateway, ModelReply};

use crate::executor::ToolExecutor;
use crate::session::Session;
use crate::tools::ToolRegistry;

/// Default maximum tool rounds per turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 20;

/// Default timeout for one backend call.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────
// Turn types
// ─────────────────────────────────────────────

/// State of a turn in progress.
#[derive(Debug)]
pub enum TurnState {
    AwaitingUserInput,
    Inferring,
    DispatchingTools(Vec<ToolCall>),
    Idle(TurnOutcome),
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The model gave a final answer.
    Completed,
    /// The model kept asking for tools past the round limit.
    RoundLimit,
    /// Tool servers could not be reached; retried next turn.
    ConnectionFailed(ConnectionError),
    /// The backend failed.
    BackendFailed(BackendError),
}

/// Progress notifications for the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// Text from the model (final answer or text alongside tool calls).
    AssistantText(String),
    /// A tool call is about to run.
    ToolCallPending {
        id: String,
        name: String,
        arguments: ToolArguments,
    },
    /// A tool call finished.
    ToolCallFinished {
        id: String,
        name: String,
        is_error: bool,
        content: String,
    },
    /// The turn ended with a diagnostic.
    Error(String),
}

/// Summary of a finished turn.
#[derive(Debug)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Final answer or diagnostic appended at the end of the turn.
    pub reply: Option<String>,
    /// Messages appended during the turn.
    pub new_messages: usize,
    pub tool_rounds: u32,
    /// Set if the end-of-turn save failed. The in-memory history is intact.
    pub persistence_error: Option<PersistenceError>,
}

impl TurnReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Completed) && self.persistence_error.is_none()
    }
}

// ─────────────────────────────────────────────
// AgentLoop
// ─────────────────────────────────────────────

/// Drives turns of a [`Session`] against a model gateway.
pub struct AgentLoop {
    gateway: Arc<dyn ModelGateway>,
    executor: ToolExecutor,
    max_tool_rounds: u32,
    backend_timeout: Duration,
    events: Option<UnboundedSender<TurnEvent>>,
}

impl AgentLoop {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self {
            gateway,
            executor: ToolExecutor::default(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            events: None,
        }
    }

    /// Build from the `agent` config section.
    pub fn from_config(gateway: Arc<dyn ModelGateway>, config: &AgentConfig) -> Self {
        Self::new(gateway)
            .with_executor(ToolExecutor::from_config(config))
            .with_max_tool_rounds(config.max_tool_rounds)
            .with_backend_timeout(Duration::from_secs(config.backend_timeout_secs))
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<TurnEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn model(&self) -> &str {
        self.gateway.model()
    }

    /// Run one turn for `input` and persist the resulting history.
    pub async fn run_turn(&self, session: &mut Session, input: &str) -> TurnReport {
        let start_len = session.messages().len();
        info!(conversation = %session.id(), "turn started");

        let mut connection = session.connect_tools().await.map(|_| ()).err();
        let (registry, conversation) = session.turn_parts();
        let definitions: Vec<ToolDefinition> = registry.definitions();

        let mut rounds: u32 = 0;
        let mut state = TurnState::AwaitingUserInput;

        let outcome = loop {
            state = match state {
                TurnState::AwaitingUserInput => {
                    conversation.push(Message::human(input));
                    match connection.take() {
                        Some(e) => {
                            error!(error = %e, "tool servers unavailable");
                            self.diagnostic(conversation, format!("Error connecting to tool servers: {e}"));
                            TurnState::Idle(TurnOutcome::ConnectionFailed(e))
                        }
                        None => TurnState::Inferring,
                    }
                }

                TurnState::Inferring => match self.infer(&conversation.messages, &definitions).await {
                    Ok(ModelReply::Text(text)) => {
                        self.emit(TurnEvent::AssistantText(text.clone()));
                        conversation.push(Message::agent_text(text));
                        TurnState::Idle(TurnOutcome::Completed)
                    }
                    Ok(ModelReply::ToolRequest { calls, text }) => {
                        if rounds >= self.max_tool_rounds {
                            warn!(rounds, "tool round limit reached");
                            self.diagnostic(
                                conversation,
                                format!(
                                    "Stopped after {rounds} tool rounds without a final answer. \
                                     Ask again to continue."
                                ),
                            );
                            TurnState::Idle(TurnOutcome::RoundLimit)
                        } else {
                            rounds += 1;
                            if let Some(ref t) = text {
                                self.emit(TurnEvent::AssistantText(t.clone()));
                            }
                            debug!(round = rounds, calls = calls.len(), "dispatching tool calls");
                            conversation.push(Message::AgentToolRequest {
                                calls: calls.clone(),
                                text,
                            });
                            TurnState::DispatchingTools(calls)
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "model backend failed");
                        self.diagnostic(conversation, format!("Error: {e}"));
                        TurnState::Idle(TurnOutcome::BackendFailed(e))
                    }
                },

                TurnState::DispatchingTools(calls) => {
                    for result in self.dispatch(&calls, registry).await {
                        conversation.push(result.into());
                    }
                    TurnState::Inferring
                }

                TurnState::Idle(outcome) => break outcome,
            };
        };

        let new_messages = session.messages().len() - start_len;
        let reply = session
            .messages()
            .last()
            .filter(|_| new_messages > 0)
            .and_then(|m| match m {
                Message::AgentText { text } => Some(text.clone()),
                _ => None,
            });

        let persistence_error = session.save().err();
        if let Some(ref e) = persistence_error {
            error!(conversation = %session.id(), error = %e, "failed to save conversation");
        }

        info!(
            conversation = %session.id(),
            rounds,
            new_messages,
            "turn finished"
        );

        TurnReport {
            outcome,
            reply,
            new_messages,
            tool_rounds: rounds,
            persistence_error,
        }
    }

    async fn infer(&self, history: &[Message], tools: &[ToolDefinition]) -> Result<ModelReply, BackendError> {
        tokio::time::timeout(self.backend_timeout, self.gateway.infer(history, tools))
            .await
            .map_err(|_| BackendError::Timeout(self.backend_timeout.as_secs()))?
    }

    /// Run a batch of calls, reporting progress per call.
    async fn dispatch(&self, calls: &[ToolCall], registry: &ToolRegistry) -> Vec<ToolResult> {
        if self.executor.is_parallel() {
            for call in calls {
                self.emit_pending(call);
            }
            let results = self.executor.execute_batch(calls, registry).await;
            for result in &results {
                self.emit_finished(result);
            }
            results
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                self.emit_pending(call);
                let result = self.executor.execute(call, registry).await;
                self.emit_finished(&result);
                results.push(result);
            }
            results
        }
    }

    fn diagnostic(&self, conversation: &mut Conversation, text: String) {
        self.emit(TurnEvent::Error(text.clone()));
        conversation.push(Message::agent_text(text));
    }

    fn emit_pending(&self, call: &ToolCall) {
        self.emit(TurnEvent::ToolCallPending {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
    }

    fn emit_finished(&self, result: &ToolResult) {
        self.emit(TurnEvent::ToolCallFinished {
            id: result.call_id.clone(),
            name: result.tool_name.clone(),
            is_error: result.is_error,
            content: result.content.clone(),
        });
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(ref tx) = self.events {
            // A closed receiver only means nobody is rendering progress.
            let _ = tx.send(event);
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! Core conversation types.
//!
//! A conversation is an ordered list of [`Message`]s. Ordering is the only
//! semantics: a [`ToolResult`] always answers a [`ToolCall`] issued by an
//! earlier [`Message::AgentToolRequest`] in the same history.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments passed to a tool: a JSON object keyed by parameter name.
pub type ToolArguments = Map<String, Value>;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// One entry in a conversation history.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Text typed by the user.
    Human { text: String },

    /// A final natural-language answer from the model.
    AgentText { text: String },

    /// The model asked for one or more tool invocations.
    AgentToolRequest {
        calls: Vec<ToolCall>,
        /// Text the model emitted alongside its tool calls, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    /// Outcome of a single tool invocation.
    ToolResult(ToolResult),
}

impl Message {
    /// Create a human message.
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human { text: text.into() }
    }

    /// Create a final agent answer.
    pub fn agent_text(text: impl Into<String>) -> Self {
        Message::AgentText { text: text.into() }
    }

    /// Create a tool request with no accompanying text.
    pub fn tool_request(calls: Vec<ToolCall>) -> Self {
        Message::AgentToolRequest { calls, text: None }
    }

    /// Short label used in logs and listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Human { .. } => "human",
            Message::AgentText { .. } => "agent_text",
            Message::AgentToolRequest { .. } => "agent_tool_request",
            Message::ToolResult(_) => "tool_result",
        }
    }

    /// Displayable text of the message, if it carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::Human { text } | Message::AgentText { text } => Some(text),
            Message::AgentToolRequest { text, .. } => text.as_deref(),
            Message::ToolResult(result) => Some(&result.content),
        }
    }

    /// Tool calls carried by this message (empty unless it is a tool request).
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::AgentToolRequest { calls, .. } => calls,
            _ => &[],
        }
    }
}

// ─────────────────────────────────────────────
// Tool calls and results
// ─────────────────────────────────────────────

/// A tool invocation requested by the model. Immutable once issued.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique within one `AgentToolRequest`; results refer back to it.
    pub id: String,
    /// Tool name as the model spelled it.
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Normalized outcome of a tool call. Failures are data, not errors.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    pub fn success(call: &ToolCall, content: impl Into<String>) -> Self {
        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Failed result.
    pub fn failure(call: &ToolCall, content: impl Into<String>) -> Self {
        ToolResult {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

impl From<ToolResult> for Message {
    fn from(result: ToolResult) -> Self {
        Message::ToolResult(result)
    }
}

// ─────────────────────────────────────────────
// Tool definitions
// ─────────────────────────────────────────────

/// Schema of a callable tool, as advertised to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ─────────────────────────────────────────────
// History invariants
// ─────────────────────────────────────────────

/// Check that every tool result answers a call issued earlier in `messages`.
///
/// Returns the offending call id on failure.
pub fn check_history(messages: &[Message]) -> Result<(), String> {
    let mut issued: HashSet<&str> = HashSet::new();
    for msg in messages {
        match msg {
            Message::AgentToolRequest { calls, .. } => {
                issued.extend(calls.iter().map(|c| c.id.as_str()));
            }
            Message::ToolResult(result) => {
                if !issued.contains(result.call_id.as_str()) {
                    return Err(result.call_id.clone());
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

/// A conversation: an id plus its ordered history.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
}

impl Conversation {
    /// Start a conversation under a fresh UUID.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Start (or resume into) a conversation with a known id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Conversation {
            id: id.into(),
            messages: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Append a message and bump `last_updated`.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.last_updated = Utc::now();
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> ToolArguments {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_message_serialization_tags() {
        let msg = Message::human("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "human");
        assert_eq!(json["text"], "hello");

        let result = ToolResult::success(&ToolCall::new("1", "get_time", ToolArguments::new()), "12:00");
        let json = serde_json::to_value(Message::from(result)).unwrap();
        assert_eq!(json["kind"], "tool_result");
        assert_eq!(json["call_id"], "1");
        assert_eq!(json["is_error"], false);
    }

    #[test]
    fn test_tool_request_text_omitted_when_none() {
        let msg = Message::tool_request(vec![ToolCall::new("a", "search", args(json!({"q": "rust"})))]);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("text").is_none());
        assert_eq!(json["calls"][0]["arguments"]["q"], "rust");
    }

    #[test]
    fn test_text_accessor() {
        assert_eq!(Message::agent_text("done").text(), Some("done"));
        assert_eq!(Message::tool_request(vec![]).text(), None);
        assert!(Message::human("x").tool_calls().is_empty());
    }

    #[test]
    fn test_result_constructors_copy_call_identity() {
        let call = ToolCall::new("call_9", "Search", ToolArguments::new());
        let ok = ToolResult::success(&call, "found");
        let err = ToolResult::failure(&call, "boom");
        assert_eq!(ok.call_id, "call_9");
        assert_eq!(ok.tool_name, "Search");
        assert!(!ok.is_error);
        assert!(err.is_error);
    }

    #[test]
    fn test_check_history_accepts_answered_calls() {
        let call = ToolCall::new("1", "get_time", ToolArguments::new());
        let history = vec![
            Message::human("what time is it?"),
            Message::tool_request(vec![call.clone()]),
            ToolResult::success(&call, "12:00").into(),
            Message::agent_text("It is noon."),
        ];
        assert!(check_history(&history).is_ok());
    }

    #[test]
    fn test_check_history_rejects_orphan_result() {
        let call = ToolCall::new("7", "get_time", ToolArguments::new());
        let history = vec![
            ToolResult::success(&call, "12:00").into(),
            Message::tool_request(vec![call]),
        ];
        assert_eq!(check_history(&history), Err("7".to_string()));
    }

    #[test]
    fn test_conversation_new_has_uuid() {
        let conv = Conversation::new();
        assert!(uuid::Uuid::parse_str(&conv.id).is_ok());
        assert!(conv.messages.is_empty());
    }

    #[test]
    fn test_conversation_push_bumps_timestamp() {
        let mut conv = Conversation::with_id("c1");
        let before = conv.last_updated;
        conv.push(Message::human("hi"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.last_updated >= before);
    }
}

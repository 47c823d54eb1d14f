//! Conversation storage — a key-value store of serialized histories with expiry.
//!
//! Each conversation has two kinds of records under the same key:
//! - `timestamp = "latest"`: the current snapshot, fully replaced on every save
//!   and carrying `last_updated`.
//! - `timestamp = <ISO 8601>`: append-only audit snapshots, one per save.
//!
//! Every record carries `expiration_time` (unix seconds, save time + TTL).
//! Expiry is enforced here, in the store layer: expired records read as
//! absent and are reclaimed when encountered.

pub mod file;
pub mod memory;

pub use file::FileConversationStore;
pub use memory::MemoryConversationStore;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;
use crate::types::{Message, ToolArguments, ToolCall, ToolResult};
use crate::utils;

/// Default record lifetime.
pub const DEFAULT_TTL_DAYS: i64 = 30;

/// Timestamp key of the current snapshot.
pub const LATEST: &str = "latest";

// ─────────────────────────────────────────────
// Store trait
// ─────────────────────────────────────────────

/// Durable home of conversation histories.
pub trait ConversationStore: Send + Sync {
    /// Replace the latest snapshot of `id` and append an audit snapshot.
    fn save(&self, id: &str, messages: &[Message]) -> Result<(), PersistenceError>;

    /// Messages of the latest snapshot. Unknown or expired ids yield `[]`.
    fn load(&self, id: &str) -> Result<Vec<Message>, PersistenceError>;

    /// Latest snapshots, most recently updated first.
    fn list(&self) -> Result<Vec<ConversationSummary>, PersistenceError>;

    /// Timestamps of the audit snapshots of `id`, oldest first.
    fn snapshots(&self, id: &str) -> Result<Vec<String>, PersistenceError>;

    /// Messages of the audit snapshot of `id` taken at `timestamp`, as
    /// returned by [`snapshots`](Self::snapshots). Unknown or expired
    /// snapshots yield `[]`.
    fn load_snapshot(&self, id: &str, timestamp: &str) -> Result<Vec<Message>, PersistenceError>;

    /// Remove every record of `id`. Returns whether anything was removed.
    fn delete(&self, id: &str) -> Result<bool, PersistenceError>;

    /// Reclaim every expired record. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize, PersistenceError>;
}

// ─────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────

/// One stored record (latest or audit snapshot).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationRecord {
    pub conversation_id: String,
    /// `"latest"` or an ISO 8601 timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    pub messages: Vec<StoredMessage>,
    /// Unix epoch seconds after which the record is reclaimed.
    pub expiration_time: i64,
}

impl ConversationRecord {
    pub fn is_latest(&self) -> bool {
        self.timestamp == LATEST
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now.timestamp()
    }

    /// Decode the stored messages, skipping entries of unknown type and
    /// tool results that name no call.
    pub fn decode_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter_map(|m| {
                let decoded = m.to_message();
                if decoded.is_none() {
                    let reason = if m.message_type == "tool" {
                        "tool result without tool_call_id"
                    } else {
                        "unknown message type"
                    };
                    warn!(
                        conversation = %self.conversation_id,
                        message_type = %m.message_type,
                        reason,
                        "skipping stored message"
                    );
                }
                decoded
            })
            .collect()
    }
}

/// Stored form of one message.
///
/// `type` is `"human"`, `"ai"` or `"tool"`. Tool requests are `"ai"` entries
/// with `tool_calls`; tool results carry `tool_call_id`, `name`, `is_error`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Absent only on tool requests that carried no text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<StoredToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Stored form of one tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoredToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: ToolArguments,
}

impl StoredMessage {
    fn plain(message_type: &str, content: &str) -> Self {
        StoredMessage {
            message_type: message_type.to_string(),
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            is_error: None,
        }
    }

    pub fn from_message(message: &Message) -> Self {
        match message {
            Message::Human { text } => Self::plain("human", text),
            Message::AgentText { text } => Self::plain("ai", text),
            Message::AgentToolRequest { calls, text } => StoredMessage {
                tool_calls: calls
                    .iter()
                    .map(|c| StoredToolCall {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        args: c.arguments.clone(),
                    })
                    .collect(),
                content: text.clone(),
                ..Self::plain("ai", "")
            },
            Message::ToolResult(result) => StoredMessage {
                tool_call_id: Some(result.call_id.clone()),
                name: Some(result.tool_name.clone()),
                is_error: Some(result.is_error),
                ..Self::plain("tool", &result.content)
            },
        }
    }

    /// Decode; `None` for unknown types and tool results without a call id.
    pub fn to_message(&self) -> Option<Message> {
        let content = self.content.as_deref().unwrap_or_default();
        match self.message_type.as_str() {
            "human" => Some(Message::human(content)),
            "ai" if self.tool_calls.is_empty() => Some(Message::agent_text(content)),
            "ai" => Some(Message::AgentToolRequest {
                calls: self
                    .tool_calls
                    .iter()
                    .map(|c| ToolCall::new(&c.id, &c.name, c.args.clone()))
                    .collect(),
                text: self.content.clone(),
            }),
            "tool" => Some(Message::ToolResult(ToolResult {
                call_id: self.tool_call_id.clone()?,
                tool_name: self.name.clone().unwrap_or_default(),
                content: content.to_string(),
                is_error: self.is_error.unwrap_or(false),
            })),
            _ => None,
        }
    }
}

/// Build the latest record and the audit record written by one save.
pub fn build_records(
    id: &str,
    messages: &[Message],
    now: DateTime<Utc>,
    ttl: Duration,
) -> (ConversationRecord, ConversationRecord) {
    let stored: Vec<StoredMessage> = messages.iter().map(StoredMessage::from_message).collect();
    let expiration_time = (now + ttl).timestamp();
    let stamp = utils::iso_timestamp(now);

    let latest = ConversationRecord {
        conversation_id: id.to_string(),
        timestamp: LATEST.to_string(),
        last_updated: Some(stamp.clone()),
        messages: stored.clone(),
        expiration_time,
    };
    let audit = ConversationRecord {
        conversation_id: id.to_string(),
        timestamp: stamp,
        last_updated: None,
        messages: stored,
        expiration_time,
    };
    (latest, audit)
}

// ─────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────

/// One entry of [`ConversationStore::list`].
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    /// Parsed `last_updated`, if it was a valid timestamp.
    pub last_updated: Option<DateTime<Utc>>,
    /// `last_updated` exactly as stored (may be malformed or absent).
    pub last_updated_raw: Option<String>,
}

impl ConversationSummary {
    pub fn from_record(record: &ConversationRecord) -> Self {
        ConversationSummary {
            id: record.conversation_id.clone(),
            last_updated: record.last_updated.as_deref().and_then(utils::parse_timestamp),
            last_updated_raw: record.last_updated.clone(),
        }
    }

    /// `YYYY-MM-DD HH:MM`, the raw value if unparseable, or `Unknown`.
    pub fn display_last_updated(&self) -> String {
        match (&self.last_updated, &self.last_updated_raw) {
            (Some(at), _) => at.format("%Y-%m-%d %H:%M").to_string(),
            (None, Some(raw)) => raw.clone(),
            (None, None) => "Unknown".to_string(),
        }
    }
}

/// Newest first; entries without a parseable timestamp go last, by raw value.
pub fn sort_summaries(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| match (&a.last_updated, &b.last_updated) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => b.last_updated_raw.cmp(&a.last_updated_raw),
    });
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

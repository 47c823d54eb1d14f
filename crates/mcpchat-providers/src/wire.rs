//! OpenAI chat completions wire format, and its mapping to conversation types.
//!
//! | Conversation message | Wire message |
//! |---|---|
//! | `Human` | `user` |
//! | `AgentText` | `assistant` |
//! | `AgentToolRequest` | `assistant` with `tool_calls` (arguments JSON-encoded) |
//! | `ToolResult` | `tool` with `tool_call_id` |

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use mcpchat_core::error::BackendError;
use mcpchat_core::types::{Message, ToolArguments, ToolCall, ToolDefinition};

use crate::traits::ModelReply;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// A chat message in the OpenAI format. Each variant maps to a `role`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum ChatMessage {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<WireToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

/// A tool call as it travels on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireToolCall {
    /// Some backends omit it; filled in by [`parse_reply`].
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// The function name and arguments within a tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments object.
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        WireToolCall {
            id: call.id.clone(),
            call_type: function_type(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

// ─────────────────────────────────────────────
// Tool definitions
// ─────────────────────────────────────────────

/// Tool definition in the OpenAI `{"type": "function", "function": {...}}` shape.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WireToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolDefinition> for WireToolDefinition {
    fn from(def: &ToolDefinition) -> Self {
        WireToolDefinition {
            tool_type: function_type(),
            function: FunctionDefinition {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
            },
        }
    }
}

// ─────────────────────────────────────────────
// Request / response bodies
// ─────────────────────────────────────────────

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Raw chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Token usage statistics.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ─────────────────────────────────────────────
// Mapping
// ─────────────────────────────────────────────

/// Convert a history to wire messages, prepending `system_prompt` if set.
pub fn to_wire_messages(system_prompt: Option<&str>, history: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        out.push(ChatMessage::System {
            content: prompt.to_string(),
        });
    }
    out.extend(history.iter().map(|msg| match msg {
        Message::Human { text } => ChatMessage::User {
            content: text.clone(),
        },
        Message::AgentText { text } => ChatMessage::Assistant {
            content: Some(text.clone()),
            tool_calls: None,
        },
        Message::AgentToolRequest { calls, text } => ChatMessage::Assistant {
            content: text.clone(),
            tool_calls: Some(calls.iter().map(WireToolCall::from).collect()),
        },
        Message::ToolResult(result) => ChatMessage::Tool {
            content: result.content.clone(),
            tool_call_id: result.call_id.clone(),
        },
    }));
    out
}

pub fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireToolDefinition> {
    tools.iter().map(WireToolDefinition::from).collect()
}

/// Turn a backend response into exactly one reply.
///
/// No choices, an empty message, tool-call arguments that are not a JSON
/// object, or two calls sharing an id are [`BackendError::Malformed`].
/// Calls without an id get `call_<index>`, suffixed until unique.
pub fn parse_reply(response: ChatCompletionResponse) -> Result<ModelReply, BackendError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Malformed("no choices in response".into()))?;

    let text = choice.message.content.filter(|c| !c.trim().is_empty());
    let wire_calls = choice.message.tool_calls.unwrap_or_default();

    if wire_calls.is_empty() {
        return text
            .map(ModelReply::Text)
            .ok_or_else(|| BackendError::Malformed("empty response".into()));
    }

    let mut taken = HashSet::new();
    for wire in wire_calls.iter().filter(|w| !w.id.is_empty()) {
        if !taken.insert(wire.id.clone()) {
            return Err(BackendError::Malformed(format!("duplicate tool call id '{}'", wire.id)));
        }
    }

    let calls = wire_calls
        .into_iter()
        .enumerate()
        .map(|(index, wire)| {
            let arguments = parse_arguments(&wire.function)?;
            let id = if wire.id.is_empty() {
                fallback_id(index, &mut taken)
            } else {
                wire.id
            };
            Ok(ToolCall::new(id, wire.function.name, arguments))
        })
        .collect::<Result<Vec<_>, BackendError>>()?;

    Ok(ModelReply::ToolRequest { calls, text })
}

/// `call_<index>`, or `call_<index>_<n>` if that is already taken.
fn fallback_id(index: usize, taken: &mut HashSet<String>) -> String {
    let mut id = format!("call_{index}");
    let mut n = 1;
    while taken.contains(&id) {
        id = format!("call_{index}_{n}");
        n += 1;
    }
    taken.insert(id.clone());
    id
}

fn parse_arguments(function: &FunctionCall) -> Result<ToolArguments, BackendError> {
    if function.arguments.trim().is_empty() {
        return Ok(ToolArguments::new());
    }
    match serde_json::from_str::<Value>(&function.arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(BackendError::Malformed(format!(
            "arguments of tool call '{}' are not a JSON object: {}",
            function.name, other
        ))),
        Err(e) => Err(BackendError::Malformed(format!(
            "arguments of tool call '{}' are not valid JSON: {}",
            function.name, e
        ))),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mcpchat_core::types::ToolResult;
    use serde_json::json;

    fn response(value: Value) -> ChatCompletionResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_history_mapping() {
        let mut args = ToolArguments::new();
        args.insert("tz".into(), json!("UTC"));
        let call = ToolCall::new("1", "get_time", args);
        let history = vec![
            Message::human("what time is it?"),
            Message::tool_request(vec![call.clone()]),
            ToolResult::success(&call, "12:00").into(),
            Message::agent_text("It is noon."),
        ];

        let wire = to_wire_messages(Some("Be brief."), &history);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json[0], json!({"role": "system", "content": "Be brief."}));
        assert_eq!(json[1], json!({"role": "user", "content": "what time is it?"}));
        assert_eq!(json[2]["role"], "assistant");
        assert!(json[2].get("content").is_none());
        assert_eq!(json[2]["tool_calls"][0]["id"], "1");
        assert_eq!(json[2]["tool_calls"][0]["type"], "function");
        assert_eq!(json[2]["tool_calls"][0]["function"]["arguments"], r#"{"tz":"UTC"}"#);
        assert_eq!(json[3], json!({"role": "tool", "content": "12:00", "tool_call_id": "1"}));
        assert_eq!(json[4], json!({"role": "assistant", "content": "It is noon."}));
    }

    #[test]
    fn test_blank_system_prompt_skipped() {
        let wire = to_wire_messages(Some("  "), &[Message::human("hi")]);
        assert_eq!(wire.len(), 1);
    }

    #[test]
    fn test_tool_definition_shape() {
        let defs = to_wire_tools(&[ToolDefinition::new(
            "search",
            "Search the web",
            json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )]);
        let json = serde_json::to_value(&defs).unwrap();
        assert_eq!(json[0]["type"], "function");
        assert_eq!(json[0]["function"]["name"], "search");
        assert_eq!(json[0]["function"]["parameters"]["properties"]["q"]["type"], "string");
    }

    #[test]
    fn test_parse_text_reply() {
        let reply = parse_reply(response(json!({
            "choices": [{"message": {"content": "Hello"}, "finish_reason": "stop"}]
        })))
        .unwrap();
        assert_eq!(reply, ModelReply::Text("Hello".into()));
    }

    #[test]
    fn test_parse_tool_reply_with_text() {
        let reply = parse_reply(response(json!({
            "choices": [{
                "message": {
                    "content": "Checking the clock.",
                    "tool_calls": [
                        {"id": "a", "type": "function", "function": {"name": "get_time", "arguments": "{}"}},
                        {"function": {"name": "search", "arguments": "{\"q\": \"rust\"}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .unwrap();

        match reply {
            ModelReply::ToolRequest { calls, text } => {
                assert_eq!(text.as_deref(), Some("Checking the clock."));
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id, "a");
                assert!(calls[0].arguments.is_empty());
                assert_eq!(calls[1].id, "call_1");
                assert_eq!(calls[1].arguments["q"], "rust");
            }
            other => panic!("expected tool request, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_arguments_string_is_empty_object() {
        let reply = parse_reply(response(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "x", "function": {"name": "get_time", "arguments": ""}}
            ]}, "finish_reason": "tool_calls"}]
        })))
        .unwrap();
        assert!(matches!(reply, ModelReply::ToolRequest { ref calls, .. } if calls[0].arguments.is_empty()));
    }

    #[test]
    fn test_non_object_arguments_are_malformed() {
        let err = parse_reply(response(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "x", "function": {"name": "search", "arguments": "[1, 2]"}}
            ]}, "finish_reason": "tool_calls"}]
        })))
        .unwrap_err();
        assert!(matches!(err, BackendError::Malformed(ref m) if m.contains("search")));
    }

    #[test]
    fn test_generated_ids_avoid_supplied_ones() {
        let reply = parse_reply(response(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "call_1", "function": {"name": "a", "arguments": "{}"}},
                {"function": {"name": "b", "arguments": "{}"}},
                {"id": "call_1_1", "function": {"name": "c", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]
        })))
        .unwrap();
        let ModelReply::ToolRequest { calls, .. } = reply else {
            panic!("expected tool request");
        };
        let ids: Vec<&str> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_1", "call_1_2", "call_1_1"]);
    }

    #[test]
    fn test_duplicate_ids_are_malformed() {
        let err = parse_reply(response(json!({
            "choices": [{"message": {"tool_calls": [
                {"id": "x", "function": {"name": "a", "arguments": "{}"}},
                {"id": "x", "function": {"name": "b", "arguments": "{}"}}
            ]}, "finish_reason": "tool_calls"}]
        })))
        .unwrap_err();
        assert!(matches!(err, BackendError::Malformed(ref m) if m.contains("duplicate tool call id 'x'")));
    }

    #[test]
    fn test_no_choices_is_malformed() {
        let err = parse_reply(response(json!({"choices": []}))).unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[test]
    fn test_empty_content_is_malformed() {
        let err = parse_reply(response(json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "stop"}]
        })))
        .unwrap_err();
        assert!(matches!(err, BackendError::Malformed(ref m) if m == "empty response"));
    }
}

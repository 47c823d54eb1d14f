//! HTTP model gateway for OpenAI-compatible `/chat/completions` APIs.
//!
//! Works with OpenAI, OpenRouter, vLLM, Ollama's OpenAI endpoint and anything
//! else speaking the same request/response shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use tracing::{debug, error, warn};

use mcpchat_core::config::BackendConfig;
use mcpchat_core::error::BackendError;
use mcpchat_core::types::{Message, ToolDefinition};

use crate::traits::{LlmRequestConfig, ModelGateway, ModelReply};
use crate::wire::{self, ChatCompletionRequest, ChatCompletionResponse};

/// Longest error body kept in a [`BackendError`].
const MAX_ERROR_BODY: usize = 500;

// ─────────────────────────────────────────────
// HttpGateway
// ─────────────────────────────────────────────

/// A model gateway talking to an OpenAI-compatible HTTP API.
pub struct HttpGateway {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://openrouter.ai/api/v1"`).
    api_base: String,
    /// API key for Bearer authentication. Empty means no auth header.
    api_key: String,
    model: String,
    /// Extra headers sent with each request.
    extra_headers: HeaderMap,
    /// Prepended to every request, never stored in the conversation.
    system_prompt: Option<String>,
    request: LlmRequestConfig,
    timeout: Duration,
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpGateway {
    /// Build a gateway from the `backend` config section.
    ///
    /// `timeout` bounds each request end to end.
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, BackendError> {
        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!(header = %key, "ignoring invalid extra header");
                }
            }
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpGateway {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            extra_headers,
            system_prompt: config.system_prompt.clone(),
            request: LlmRequestConfig {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            timeout,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn build_request(&self, history: &[Message], tools: &[ToolDefinition]) -> ChatCompletionRequest {
        let has_tools = !tools.is_empty();
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: wire::to_wire_messages(self.system_prompt.as_deref(), history),
            tools: has_tools.then(|| wire::to_wire_tools(tools)),
            tool_choice: has_tools.then(|| "auto".to_string()),
            max_tokens: Some(self.request.max_tokens),
            temperature: Some(self.request.temperature),
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.as_secs())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn infer(
        &self,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, BackendError> {
        debug!(
            model = %self.model,
            messages = history.len(),
            tools = tools.len(),
            "Calling model backend"
        );

        let mut request = self
            .client
            .post(self.completions_url())
            .headers(self.extra_headers.clone())
            .json(&self.build_request(history, tools));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(error = %e, "HTTP request failed");
            self.transport_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            let body = mcpchat_core::utils::truncate_string(&body, MAX_ERROR_BODY);
            error!(status = %status, body = %body, "API error");

            return Err(if status.as_u16() == 429 {
                BackendError::RateLimited { retry_after, body }
            } else {
                BackendError::Status {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, "Failed to parse model response");
            BackendError::Malformed(format!("unparseable response body: {e}"))
        })?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "token usage"
            );
        }

        let reply = wire::parse_reply(parsed)?;
        debug!(
            tool_calls = match &reply {
                ModelReply::ToolRequest { calls, .. } => calls.len(),
                ModelReply::Text(_) => 0,
            },
            "Model response received"
        );
        Ok(reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mcpchat_core::types::{ToolArguments, ToolCall, ToolResult};
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_key: &str, api_base: &str) -> BackendConfig {
        BackendConfig {
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            model: "gpt-4o".to_string(),
            ..Default::default()
        }
    }

    fn gateway(config: &BackendConfig) -> HttpGateway {
        HttpGateway::new(config, Duration::from_secs(10)).unwrap()
    }

    fn text_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "choices": [{
                "message": { "content": content },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        })
    }

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let gw = gateway(&make_config("key", "https://api.openai.com/v1/"));
        assert_eq!(gw.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_completions_url_no_trailing_slash() {
        let gw = gateway(&make_config("key", "https://api.openai.com/v1"));
        assert_eq!(gw.completions_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_extra_headers() {
        let mut config = make_config("key", "http://localhost");
        let mut headers = HashMap::new();
        headers.insert("X-Title".to_string(), "mcpchat".to_string());
        headers.insert("bad header".to_string(), "x".to_string());
        config.extra_headers = Some(headers);
        let gw = gateway(&config);
        assert!(gw.extra_headers.contains_key("x-title"));
        assert_eq!(gw.extra_headers.len(), 1);
    }

    #[test]
    fn test_request_omits_tools_when_none() {
        let gw = gateway(&make_config("key", "http://localhost"));
        let req = gw.build_request(&[Message::human("hi")], &[]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_infer_text() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello there.")))
            .mount(&mock_server)
            .await;

        let gw = gateway(&make_config("test-key-123", &mock_server.uri()));
        let reply = gw.infer(&[Message::human("Hello")], &[]).await.unwrap();
        assert_eq!(reply, ModelReply::Text("Hello there.".into()));
    }

    #[tokio::test]
    async fn test_infer_tool_calls() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-tools",
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc123",
                            "type": "function",
                            "function": {
                                "name": "web_search",
                                "arguments": "{\"query\": \"Rust programming\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&mock_server)
            .await;

        let gw = gateway(&make_config("key", &mock_server.uri()));
        let tool_def = ToolDefinition::new(
            "web_search",
            "Search the web",
            serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        );

        let reply = gw
            .infer(&[Message::human("Search for Rust")], &[tool_def])
            .await
            .unwrap();

        match reply {
            ModelReply::ToolRequest { calls, text } => {
                assert!(text.is_none());
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_abc123");
                assert_eq!(calls[0].name, "web_search");
                assert_eq!(calls[0].arguments["query"], "Rust programming");
            }
            other => panic!("expected tool request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_infer_sends_history_tools_and_system_prompt() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o",
                "max_tokens": 4096,
                "tool_choice": "auto",
                "tools": [{"type": "function", "function": {"name": "get_time"}}],
                "messages": [
                    {"role": "system", "content": "You are terse."},
                    {"role": "user", "content": "what time is it?"},
                    {"role": "assistant", "tool_calls": [{"id": "1", "function": {"name": "get_time"}}]},
                    {"role": "tool", "tool_call_id": "1", "content": "12:00"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("It is noon.")))
            .mount(&mock_server)
            .await;

        let mut config = make_config("key", &mock_server.uri());
        config.system_prompt = Some("You are terse.".into());
        let gw = gateway(&config);

        let call = ToolCall::new("1", "get_time", ToolArguments::new());
        let history = vec![
            Message::human("what time is it?"),
            Message::tool_request(vec![call.clone()]),
            ToolResult::success(&call, "12:00").into(),
        ];
        let tools = vec![ToolDefinition::new(
            "get_time",
            "Current time",
            serde_json::json!({"type": "object"}),
        )];

        // If the body matcher fails, wiremock returns 404 → Status error
        let reply = gw.infer(&history, &tools).await.unwrap();
        assert_eq!(reply, ModelReply::Text("It is noon.".into()));
    }

    #[tokio::test]
    async fn test_infer_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "7")
                    .set_body_json(serde_json::json!({
                        "error": { "message": "Rate limit exceeded", "type": "rate_limit_error" }
                    })),
            )
            .mount(&mock_server)
            .await;

        let gw = gateway(&make_config("key", &mock_server.uri()));
        let err = gw.infer(&[Message::human("Hello")], &[]).await.unwrap_err();

        match err {
            BackendError::RateLimited { retry_after, body } => {
                assert_eq!(retry_after, Some(7));
                assert!(body.contains("Rate limit exceeded"));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_infer_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&mock_server)
            .await;

        let gw = gateway(&make_config("key", &mock_server.uri()));
        let err = gw.infer(&[Message::human("Hello")], &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, ref body } if body == "upstream exploded"));
    }

    #[tokio::test]
    async fn test_infer_malformed_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let gw = gateway(&make_config("key", &mock_server.uri()));
        let err = gw.infer(&[Message::human("Hello")], &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_infer_network_error() {
        // Point to a port that's not listening
        let gw = gateway(&make_config("key", "http://127.0.0.1:1"));
        let err = gw.infer(&[Message::human("Hello")], &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[tokio::test]
    async fn test_infer_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_body("late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let gw = HttpGateway::new(&make_config("key", &mock_server.uri()), Duration::from_secs(1)).unwrap();
        let err = gw.infer(&[Message::human("Hello")], &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(1)));
    }
}

//! MCP over streamable HTTP.
//!
//! Every JSON-RPC message is POSTed to the endpoint. The server answers with
//! either `application/json` or a `text/event-stream` whose events carry the
//! response. A session id handed out on `initialize` (`Mcp-Session-Id`) is
//! echoed on every later request and released with DELETE on shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mcpchat_core::types::ToolArguments;

use super::protocol::*;
use super::{McpClient, McpError};

const HEADER_SESSION_ID: &str = "Mcp-Session-Id";
const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";
const JSON_MIME_TYPE: &str = "application/json";

/// MCP server reached over streamable HTTP.
pub struct HttpMcpClient {
    server_name: String,
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    next_id: AtomicU64,
    session_id: Mutex<Option<String>>,
    /// Bounds every exchange except `tools/call`, which runs until the
    /// caller gives up on it.
    request_timeout: Duration,
}

impl HttpMcpClient {
    /// Connect and perform the initialize handshake.
    pub async fn connect(
        server_name: &str,
        url: &str,
        headers: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| McpError::Transport(format!("failed to build HTTP client: {e}")))?;

        let client = Self {
            server_name: server_name.to_string(),
            client,
            url: url.to_string(),
            headers: build_headers(server_name, headers),
            next_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
            request_timeout,
        };

        let params = serde_json::to_value(InitializeParams::current())?;
        client
            .send_request("initialize", Some(params), Some(request_timeout))
            .await?;
        let initialized = serde_json::to_value(JsonRpcNotification::new("notifications/initialized"))?;
        if let Err(e) = client.post(&initialized, None, Some(request_timeout)).await {
            client.shutdown().await;
            return Err(e);
        }
        debug!(server = %server_name, url = %url, "MCP HTTP session initialized");
        Ok(client)
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::to_value(JsonRpcRequest::new(id, method, params))?;
        self.post(&request, Some(id), timeout)
            .await?
            .ok_or_else(|| McpError::Protocol(format!("no response to '{method}'")))?
            .into_result()
    }

    /// POST one message. Returns the response matching `expect_id`, if any.
    async fn post(
        &self,
        message: &Value,
        expect_id: Option<u64>,
        timeout: Option<Duration>,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, format!("{JSON_MIME_TYPE}, {EVENT_STREAM_MIME_TYPE}"))
            .json(message);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }
        if let Some(ref session) = *self.session_id.lock().await {
            request = request.header(HEADER_SESSION_ID, session);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout
            } else {
                McpError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Http {
                status: status.as_u16(),
                body,
            });
        }

        if let Some(session) = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        if matches!(status, StatusCode::ACCEPTED | StatusCode::NO_CONTENT) {
            return Ok(None);
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with(EVENT_STREAM_MIME_TYPE));
        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let Some(expected) = expect_id else {
            return Ok(None);
        };
        if body.trim().is_empty() {
            return Ok(None);
        }

        if is_event_stream {
            for data in sse_events(&body) {
                match serde_json::from_str::<JsonRpcResponse>(&data) {
                    Ok(resp) if resp.id == Some(expected) => return Ok(Some(resp)),
                    Ok(_) => {}
                    Err(_) => debug!(server = %self.server_name, "ignoring non-JSON-RPC event"),
                }
            }
            Ok(None)
        } else {
            let resp: JsonRpcResponse = serde_json::from_str(&body)?;
            Ok(Some(resp))
        }
    }
}

/// Build default headers. A bare token in `Authorization` becomes `Bearer <token>`.
fn build_headers(server_name: &str, headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!(server = %server_name, header = %name, "invalid header name, skipping");
            continue;
        };
        let value = value.trim();
        let value = if header_name == AUTHORIZATION && !value.contains(char::is_whitespace) {
            format!("Bearer {value}")
        } else {
            value.to_string()
        };
        match HeaderValue::from_str(&value) {
            Ok(v) => {
                map.insert(header_name, v);
            }
            Err(_) => warn!(server = %server_name, header = %name, "invalid header value, skipping"),
        }
    }
    map
}

/// Data payloads of a `text/event-stream` body, one per event.
fn sse_events(body: &str) -> Vec<String> {
    let mut events = Vec::new();
    let mut data: Vec<&str> = Vec::new();
    for line in body.lines() {
        if line.is_empty() {
            if !data.is_empty() {
                events.push(data.join("\n"));
                data.clear();
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if !data.is_empty() {
        events.push(data.join("\n"));
    }
    events
}

#[async_trait]
impl McpClient for HttpMcpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let result = self
                .send_request("tools/list", params, Some(self.request_timeout))
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| McpError::Protocol(format!("failed to parse tools list: {e}")))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<ToolCallResult, McpError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let result = self
            .send_request("tools/call", Some(serde_json::to_value(&params)?), None)
            .await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("failed to parse tool result: {e}")))
    }

    async fn shutdown(&self) {
        let Some(session) = self.session_id.lock().await.take() else {
            return;
        };
        let result = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(HEADER_SESSION_ID, session)
            .timeout(self.request_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() || resp.status() == StatusCode::METHOD_NOT_ALLOWED => {
                debug!(server = %self.server_name, "MCP HTTP session closed");
            }
            Ok(resp) => warn!(server = %self.server_name, status = %resp.status(), "session close rejected"),
            Err(e) => warn!(server = %self.server_name, error = %e, "session close failed"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_handshake(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(HEADER_SESSION_ID, "sess-42")
                    .set_body_json(json!({
                        "jsonrpc": "2.0", "id": 1,
                        "result": {"protocolVersion": PROTOCOL_VERSION, "capabilities": {}}
                    })),
            )
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
    }

    #[test]
    fn test_sse_events() {
        let body = "event: message\ndata: {\"a\":1}\n\n: comment\ndata: {\"b\":\ndata: 2}\n\n";
        assert_eq!(sse_events(body), vec!["{\"a\":1}", "{\"b\":\n2}"]);
    }

    #[test]
    fn test_bare_token_becomes_bearer() {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), "abc123".to_string());
        headers.insert("X-Team".to_string(), "core".to_string());
        let map = build_headers("s", &headers);
        assert_eq!(map.get(AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(map.get("x-team").unwrap(), "core");
    }

    #[tokio::test]
    async fn test_json_responses_and_session_header() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header(HEADER_SESSION_ID, "sess-42"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2,
                "result": {"tools": [{"name": "search", "description": "Web search",
                                      "inputSchema": {"type": "object"}}]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/mcp"))
            .and(header(HEADER_SESSION_ID, "sess-42"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let client = HttpMcpClient::connect("web", &url, &HashMap::new(), Duration::from_secs(5))
            .await
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_event_stream_tool_call() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        let sse = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"12:00\"}]}}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/call", "params": {"name": "get_time"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse, EVENT_STREAM_MIME_TYPE),
            )
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let client = HttpMcpClient::connect("clock", &url, &HashMap::new(), Duration::from_secs(5))
            .await
            .unwrap();

        let result = client.call_tool("get_time", ToolArguments::new()).await.unwrap();
        assert_eq!(result.text(), "12:00");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn test_rpc_error_surfaces() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2,
                "error": {"code": -32602, "message": "Unknown tool"}
            })))
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let client = HttpMcpClient::connect("s", &url, &HashMap::new(), Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.call_tool("nope", ToolArguments::new()).await.unwrap_err();
        assert!(matches!(err, McpError::Rpc { code: -32602, .. }));
    }

    #[tokio::test]
    async fn test_call_outlives_request_timeout() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(1))
                    .set_body_json(json!({
                        "jsonrpc": "2.0", "id": 2,
                        "result": {"content": [{"type": "text", "text": "done"}]}
                    })),
            )
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let client = HttpMcpClient::connect("slow", &url, &HashMap::new(), Duration::from_millis(300))
            .await
            .unwrap();
        let result = client.call_tool("slow", ToolArguments::new()).await.unwrap();
        assert_eq!(result.text(), "done");
    }

    #[tokio::test]
    async fn test_failed_initialized_notification_closes_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(HEADER_SESSION_ID, "sess-7")
                    .set_body_json(json!({
                        "jsonrpc": "2.0", "id": 1,
                        "result": {"protocolVersion": PROTOCOL_VERSION, "capabilities": {}}
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/mcp"))
            .and(header(HEADER_SESSION_ID, "sess-7"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let err = match HttpMcpClient::connect("s", &url, &HashMap::new(), Duration::from_secs(5)).await {
            Err(e) => e,
            Ok(_) => panic!("expected handshake failure"),
        };
        assert!(matches!(err, McpError::Http { status: 500, .. }));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_http_error_on_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
            .mount(&server)
            .await;

        let url = format!("{}/mcp", server.uri());
        let err = match HttpMcpClient::connect("s", &url, &HashMap::new(), Duration::from_secs(5)).await {
            Err(e) => e,
            Ok(_) => panic!("expected HTTP error"),
        };
        assert!(matches!(err, McpError::Http { status: 503, .. }));
    }
}

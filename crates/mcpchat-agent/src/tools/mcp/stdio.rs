//! MCP over a child process's stdin/stdout, one JSON-RPC message per line.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use mcpchat_core::types::ToolArguments;

use super::protocol::*;
use super::{McpClient, McpError};

/// Variables passed through from the parent environment. Everything else
/// comes from the server's `env` entry.
const INHERITED_ENV: &[&str] = &[
    "HOME", "LOGNAME", "PATH", "SHELL", "TERM", "USER", "LANG", "TMPDIR", "SYSTEMROOT",
    "APPDATA", "USERPROFILE", "TEMP", "TMP",
];

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// MCP server running as a child process.
///
/// The child is killed when the client is shut down or dropped.
pub struct StdioMcpClient {
    server_name: String,
    next_id: AtomicU64,
    /// One request/response exchange at a time.
    pipes: Mutex<Pipes>,
    child: Mutex<Option<Child>>,
    /// Bounds the handshake and `tools/list`. `tools/call` runs until the
    /// caller gives up on it.
    request_timeout: Duration,
}

impl StdioMcpClient {
    /// Spawn the server process and perform the initialize handshake.
    pub async fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
        request_timeout: Duration,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;

        // Drain stderr into the log so a chatty server never blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let name = server_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %name, "stderr: {}", line);
                }
            });
        }

        let client = Self {
            server_name: server_name.to_string(),
            next_id: AtomicU64::new(1),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            child: Mutex::new(Some(child)),
            request_timeout,
        };

        if let Err(e) = client.initialize().await {
            client.shutdown().await;
            return Err(e);
        }
        Ok(client)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::to_value(InitializeParams::current())?;
        let response = self
            .send_request("initialize", Some(params), Some(self.request_timeout))
            .await?;
        let protocol = response
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        debug!(server = %self.server_name, protocol, "MCP server initialized");

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &JsonRpcNotification::new("notifications/initialized")).await
    }

    /// Send a request and wait for the response carrying the same id,
    /// for at most `timeout` when one is given.
    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &request).await?;

        let read = read_response(&self.server_name, &mut pipes.stdout, id);
        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| McpError::Timeout)??,
            None => read.await?,
        };

        response.into_result()
    }
}

async fn write_line<T: serde::Serialize>(stdin: &mut ChildStdin, message: &T) -> Result<(), McpError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Read stdout lines until the response with `expected_id` arrives.
///
/// Server notifications and non-JSON log lines are skipped.
async fn read_response(
    server_name: &str,
    stdout: &mut BufReader<ChildStdout>,
    expected_id: u64,
) -> Result<JsonRpcResponse, McpError> {
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = stdout.read_line(&mut buf).await?;
        if n == 0 {
            return Err(McpError::Transport("server closed stdout".into()));
        }
        let trimmed = buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
            Ok(resp) => {
                debug!(server = %server_name, id = ?resp.id, "skipping non-matching JSON-RPC message");
            }
            Err(_) => {
                debug!(server = %server_name, line = trimmed, "ignoring non-JSON-RPC line");
            }
        }
    }
}

#[async_trait]
impl McpClient for StdioMcpClient {
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
        let mut child_guard = self.child.lock().await;
        if let Some(mut child) = child_guard.take() {
            if let Err(e) = child.kill().await {
                warn!(server = %self.server_name, error = %e, "failed to kill tool server");
            }
            debug!(server = %self.server_name, "tool server stopped");
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

//! Error taxonomy.
//!
//! Turn-level errors ([`ConnectionError`], [`BackendError`]) end the current
//! turn but leave the conversation resumable. Per-call errors ([`ToolError`])
//! never leave the tool executor; they become error tool results.

use std::path::PathBuf;

use thiserror::Error;

/// Tool discovery / session setup failed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to start tool server '{server}': {reason}")]
    Spawn { server: String, reason: String },

    #[error("tool server '{server}' failed the handshake: {reason}")]
    Handshake { server: String, reason: String },

    #[error("tool server '{server}' is unreachable: {reason}")]
    Unreachable { server: String, reason: String },

    #[error("tool server '{server}' returned a malformed tool list: {reason}")]
    MalformedToolList { server: String, reason: String },
}

impl ConnectionError {
    /// Name of the server that failed.
    pub fn server(&self) -> &str {
        match self {
            ConnectionError::Spawn { server, .. }
            | ConnectionError::Handshake { server, .. }
            | ConnectionError::Unreachable { server, .. }
            | ConnectionError::MalformedToolList { server, .. } => server,
        }
    }
}

/// The model backend could not produce a usable response.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to model backend failed: {0}")]
    Transport(String),

    #[error("model backend rate limited the request: {body}")]
    RateLimited { retry_after: Option<u64>, body: String },

    #[error("model backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model backend returned a malformed response: {0}")]
    Malformed(String),

    #[error("model backend did not respond within {0}s")]
    Timeout(u64),
}

/// A single tool call failed. Converted into an error tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool '{tool}' failed: {reason}")]
    Execution { tool: String, reason: String },

    #[error("tool '{tool}' did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },
}

/// Conversation storage failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode conversation record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("corrupt conversation record at {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("conversation store lock poisoned")]
    Poisoned,
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration could not be read or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid tool server config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_names_server() {
        let err = ConnectionError::Unreachable {
            server: "weather".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(err.server(), "weather");
        assert!(err.to_string().contains("weather"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_tool_not_found_message() {
        let err = ToolError::NotFound("Search".into());
        assert_eq!(err.to_string(), "tool not found: Search");
    }

    #[test]
    fn test_persistence_io_display_includes_path() {
        let err = PersistenceError::io(
            "/tmp/x/latest.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("/tmp/x/latest.json"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_backend_timeout_display() {
        assert_eq!(
            BackendError::Timeout(120).to_string(),
            "model backend did not respond within 120s"
        );
    }
}

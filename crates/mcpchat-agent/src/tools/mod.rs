//! Tools: the `Tool` trait, MCP clients, and the per-session registry.

pub mod base;
pub mod mcp;
pub mod registry;

pub use base::Tool;
pub use mcp::{McpClient, McpError, McpTool};
pub use registry::ToolRegistry;

/// In-process tools shared by the tests of this crate.
#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use mcpchat_core::error::ToolError;
    use mcpchat_core::types::ToolArguments;

    use super::Tool;

    /// Echoes its `text` argument.
    pub struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)");
            Ok(format!("Echo: {text}"))
        }
    }

    /// Always fails.
    pub struct FailTool(pub String);

    impl FailTool {
        pub fn named(name: &str) -> Self {
            FailTool(name.to_string())
        }
    }

    #[async_trait]
    impl Tool for FailTool {
        fn name(&self) -> &str {
            &self.0
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: ToolArguments) -> Result<String, ToolError> {
            Err(ToolError::Execution {
                tool: self.0.clone(),
                reason: "intentional failure".into(),
            })
        }
    }

    /// Returns a fixed answer, optionally after a delay.
    pub struct StaticTool {
        pub name: String,
        pub output: String,
        pub delay: Duration,
    }

    impl StaticTool {
        pub fn new(name: &str, output: &str) -> Self {
            StaticTool {
                name: name.to_string(),
                output: output.to_string(),
                delay: Duration::ZERO,
            }
        }

        pub fn slow(name: &str, output: &str, delay: Duration) -> Self {
            StaticTool {
                delay,
                ..Self::new(name, output)
            }
        }
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            &self.name
        }
        fn description(&self) -> &str {
            "Returns a fixed answer"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: ToolArguments) -> Result<String, ToolError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.output.clone())
        }
    }
}

//! Tool trait — the capability every callable tool implements.

use async_trait::async_trait;
use serde_json::Value;

use mcpchat_core::error::ToolError;
use mcpchat_core::types::{ToolArguments, ToolDefinition};

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// Every tool implements this trait.
///
/// The agent loop sends tool schemas to the model via `to_definition()` and
/// dispatches calls via `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name used by the model to call this tool (e.g. `"get_time"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the arguments object.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// Returns the output the model reads. Failures are returned as `Err`;
    /// the executor turns them into error tool results.
    async fn execute(&self, arguments: ToolArguments) -> Result<String, ToolError>;

    /// Build the `ToolDefinition` sent to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_definition_default() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str {
                "dummy"
            }
            fn description(&self) -> &str {
                "A test tool"
            }
            fn parameters(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": { "msg": { "type": "string" } },
                    "required": ["msg"]
                })
            }
            async fn execute(&self, _arguments: ToolArguments) -> Result<String, ToolError> {
                Ok("ok".into())
            }
        }

        let def = DummyTool.to_definition();
        assert_eq!(def.name, "dummy");
        assert_eq!(def.description, "A test tool");
        assert_eq!(def.parameters["required"][0], "msg");
    }
}

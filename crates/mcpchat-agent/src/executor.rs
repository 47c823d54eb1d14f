//! Tool executor — resolves tool calls against the registry and normalizes
//! every outcome into a [`ToolResult`].
//!
//! Never fails: an unknown tool, a timeout or a tool error all become
//! `is_error = true` results, so every issued call gets exactly one result.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use mcpchat_core::config::AgentConfig;
use mcpchat_core::error::ToolError;
use mcpchat_core::types::{ToolCall, ToolResult};

use crate::tools::ToolRegistry;

/// Default per-call timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs tool calls with a per-call timeout.
#[derive(Clone, Debug)]
pub struct ToolExecutor {
    timeout: Duration,
    parallel: bool,
}

impl ToolExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            parallel: false,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(Duration::from_secs(config.tool_timeout_secs)).with_parallel(config.parallel_tool_calls)
    }

    /// Run batches concurrently (results still come back in issue order).
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Execute one call.
    pub async fn execute(&self, call: &ToolCall, registry: &ToolRegistry) -> ToolResult {
        match self.invoke(call, registry).await {
            Ok(output) => {
                debug!(tool = %call.name, call_id = %call.id, "tool call succeeded");
                ToolResult::success(call, output)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolResult::failure(call, e.to_string())
            }
        }
    }

    /// Execute a batch, returning one result per call in issue order.
    pub async fn execute_batch(&self, calls: &[ToolCall], registry: &ToolRegistry) -> Vec<ToolResult> {
        if self.parallel {
            join_all(calls.iter().map(|call| self.execute(call, registry))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute(call, registry).await);
            }
            results
        }
    }

    async fn invoke(&self, call: &ToolCall, registry: &ToolRegistry) -> Result<String, ToolError> {
        let tool = registry
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        tokio::time::timeout(self.timeout, tool.execute(call.arguments.clone()))
            .await
            .map_err(|_| ToolError::Timeout {
                tool: call.name.clone(),
                secs: self.timeout.as_secs(),
            })?
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

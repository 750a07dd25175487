//! Tool dispatcher with timeout and concurrency control
//!
//! This is the `ToolDispatch` implementation the workflow engine calls. It
//! resolves the tool, checks the action and required parameters, and runs
//! the call under a timeout. Every failure mode becomes a failed
//! `ToolResult`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

use relay_core::config::get_config_int;
use relay_core::{Error, InvocationMode, ToolCall, ToolDispatch, ToolResult};

use crate::{ToolDefinition, ToolRegistry};

/// Configuration for tool dispatch
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum concurrent tool executions across all workflows
    pub max_concurrent: usize,
    /// Default timeout for tool execution (ms)
    pub default_timeout_ms: u64,
    /// Maximum timeout a call may ask for (ms)
    pub max_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            default_timeout_ms: 30_000,
            max_timeout_ms: 300_000,
        }
    }
}

impl DispatcherConfig {
    /// Read `RELAY_TOOL_TIMEOUT_MS`, `RELAY_TOOL_MAX_TIMEOUT_MS` and
    /// `RELAY_TOOL_MAX_CONCURRENT`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent: get_config_int(
                "RELAY_TOOL_MAX_CONCURRENT",
                defaults.max_concurrent as i64,
            )
            .max(1) as usize,
            default_timeout_ms: get_config_int(
                "RELAY_TOOL_TIMEOUT_MS",
                defaults.default_timeout_ms as i64,
            )
            .max(1) as u64,
            max_timeout_ms: get_config_int(
                "RELAY_TOOL_MAX_TIMEOUT_MS",
                defaults.max_timeout_ms as i64,
            )
            .max(1) as u64,
        }
    }

    pub fn with_default_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.max_timeout_ms = timeout_ms.max(1);
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }
}

/// Routes tool calls to registered tools
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    config: DispatcherConfig,
    semaphore: Arc<Semaphore>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, config: DispatcherConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            registry,
            config,
            semaphore,
        }
    }

    pub fn with_defaults(registry: Arc<ToolRegistry>) -> Self {
        Self::new(registry, DispatcherConfig::default())
    }

    /// Get registry reference
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}

/// Checks that run before a call is dispatched
fn preflight(call: &ToolCall, available: bool, definition: &ToolDefinition) -> relay_core::Result<()> {
    if !available {
        return Err(Error::tool_execution(format!(
            "tool '{}' is not available",
            call.tool_name
        )));
    }

    if !definition.supports_action(&call.action_name) {
        return Err(Error::invalid_argument(format!(
            "tool '{}' does not support action '{}'",
            call.tool_name, call.action_name
        )));
    }

    if call.mode == InvocationMode::Execute {
        let missing: Vec<&str> = definition
            .required_params()
            .into_iter()
            .filter(|p| !call.params.contains_key(*p))
            .collect();
        if !missing.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Missing required parameter(s) for {}.{}: {}",
                call.tool_name,
                call.action_name,
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl ToolDispatch for ToolDispatcher {
    async fn invoke(&self, call: ToolCall) -> ToolResult {
        let start = Instant::now();

        let Some((tool, definition)) = self.registry.get(&call.tool_name).await else {
            warn!(tool = %call.tool_name, "Unknown tool requested");
            let err = Error::not_found(format!("Unknown tool: {}", call.tool_name));
            return ToolResult::error(err.to_string());
        };

        if let Err(e) = preflight(&call, tool.is_available(), &definition) {
            debug!(tool = %call.tool_name, error = %e, "Tool call rejected");
            return ToolResult::error(e.to_string());
        }

        let timeout_ms = call
            .timeout_ms
            .unwrap_or(self.config.default_timeout_ms)
            .min(self.config.max_timeout_ms);

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return ToolResult::error("Dispatcher shut down"),
        };

        debug!(
            tool = %call.tool_name,
            action = %call.action_name,
            mode = ?call.mode,
            timeout_ms,
            "Dispatching tool call"
        );

        let input = Value::Object(call.params.clone());
        let fut = async {
            match call.mode {
                InvocationMode::Execute => tool.execute(&call.action_name, input).await,
                InvocationMode::Clarify => tool.clarify(&call.action_name, input).await,
            }
        };

        let result = match timeout(Duration::from_millis(timeout_ms), fut).await {
            Ok(Ok(data)) => ToolResult::success(data),
            Ok(Err(e)) => {
                debug!(tool = %call.tool_name, error = %e, "Tool returned error");
                ToolResult::error(e.to_string())
            }
            Err(_) => {
                warn!(tool = %call.tool_name, timeout_ms, "Tool call timed out");
                let err = Error::Timeout(format!("tool execution timed out after {}ms", timeout_ms));
                ToolResult::error(err.to_string())
            }
        };

        result
            .with_metadata("tool", json!(call.tool_name))
            .with_metadata("action", json!(call.action_name))
            .with_metadata("call_id", json!(call.id))
            .with_metadata(
                "execution_time_ms",
                json!(start.elapsed().as_millis() as u64),
            )
    }
}

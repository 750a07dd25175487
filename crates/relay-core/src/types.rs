//! Tool dispatch wire types shared by the engine and the tool layer

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

/// How a tool is being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    /// Perform the action
    #[default]
    Execute,
    /// Return the option set a user must choose from, without acting
    Clarify,
}

/// A single tool invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub action_name: String,
    pub params: Map<String, Value>,
    #[serde(default)]
    pub mode: InvocationMode,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ToolCall {
    pub fn new(
        tool_name: impl Into<String>,
        action_name: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            action_name: action_name.into(),
            params,
            mode: InvocationMode::Execute,
            timeout_ms: None,
        }
    }

    /// Switch this call into clarification mode
    pub fn clarify(mut self) -> Self {
        self.mode = InvocationMode::Clarify;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Outcome of a tool invocation: `{success, data, error, metadata}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Error message, or a generic one when the tool gave none
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "tool reported failure without a message".to_string())
    }
}

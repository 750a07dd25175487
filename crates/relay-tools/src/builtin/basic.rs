//! Pass-through tools: echo, display, fail

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::Tool;

/// Tool: Echo
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the given parameters unchanged."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, _action: &str, input: Value) -> Result<Value> {
        Ok(input)
    }
}

/// Tool: Display
///
/// Hands `content` through untouched so the progress channel receives the
/// original payload, images included.
pub struct DisplayTool;

#[async_trait]
impl Tool for DisplayTool {
    fn name(&self) -> &str {
        "display"
    }

    fn description(&self) -> &str {
        "Present content to the user. Large payloads are forwarded as-is."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "description": "Payload to present" },
                "source": { "type": "string", "description": "Step whose result is shown" },
                "caption": { "type": "string" }
            },
            "required": ["content"]
        })
    }

    fn actions(&self) -> Vec<String> {
        vec!["show".to_string()]
    }

    async fn execute(&self, _action: &str, input: Value) -> Result<Value> {
        Ok(json!({
            "displayed": true,
            "source": input.get("source").cloned().unwrap_or(Value::Null),
            "caption": input.get("caption").cloned().unwrap_or(Value::Null),
            "content": input.get("content").cloned().unwrap_or(Value::Null),
        }))
    }

    fn category(&self) -> &str {
        "response"
    }
}

/// Tool: Fail
pub struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails with the given message."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "message": { "type": "string" } }
        })
    }

    async fn execute(&self, _action: &str, input: Value) -> Result<Value> {
        let message = input
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("requested failure");
        bail!("{}", message)
    }

    fn category(&self) -> &str {
        "testing"
    }
}

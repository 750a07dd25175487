//! The `Tool` trait every dispatchable tool implements

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key; must be unique
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema; its `required` list is enforced before execution
    fn input_schema(&self) -> Value;

    /// Action names this tool accepts. Empty means any action.
    fn actions(&self) -> Vec<String> {
        vec![]
    }

    async fn execute(&self, action: &str, input: Value) -> Result<Value>;

    /// Produce the option set for a step that needs a user decision.
    ///
    /// The default echoes a declared `options` parameter, or an empty list.
    async fn clarify(&self, _action: &str, input: Value) -> Result<Value> {
        let options = input
            .get("options")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        Ok(json!({ "options": options }))
    }

    fn category(&self) -> &str {
        "general"
    }

    fn tags(&self) -> Vec<String> {
        vec![]
    }

    /// Unavailable tools are rejected at dispatch
    fn is_available(&self) -> bool {
        true
    }
}

pub type BoxedTool = Arc<dyn Tool>;

/// Tool backed by a closure
#[derive(Clone)]
pub struct SimpleTool {
    name: String,
    description: String,
    schema: Value,
    handler: Arc<dyn Fn(&str, Value) -> Result<Value> + Send + Sync>,
}

impl SimpleTool {
    pub fn new<F>(name: &str, description: &str, schema: Value, handler: F) -> Self
    where
        F: Fn(&str, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for SimpleTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, action: &str, input: Value) -> Result<Value> {
        (self.handler)(action, input)
    }
}

//! Ask-user tool
//!
//! Steps that need a human decision point at this tool. In clarification
//! mode it returns the question and option set; executing it afterwards
//! simply reports the question that was asked.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::Tool;

pub struct AskUserTool;

fn question_and_options(input: &Value) -> (String, Vec<String>) {
    let question = input
        .get("question")
        .and_then(|v| v.as_str())
        .unwrap_or("Could you please provide more details?")
        .to_string();

    let options = input
        .get("options")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();

    (question, options)
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Ask the user to choose between options before the workflow continues."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "options": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, _action: &str, input: Value) -> Result<Value> {
        let (question, options) = question_and_options(&input);
        Ok(json!({ "question": question, "options": options, "awaiting_input": false }))
    }

    async fn clarify(&self, _action: &str, input: Value) -> Result<Value> {
        let (question, options) = question_and_options(&input);
        Ok(json!({ "question": question, "options": options, "awaiting_input": true }))
    }

    fn category(&self) -> &str {
        "response"
    }

    fn tags(&self) -> Vec<String> {
        vec!["clarification".to_string(), "input".to_string()]
    }
}

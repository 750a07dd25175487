//! Numeric aggregation tool

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tool::Tool;

/// Tool: Compute
///
/// Aggregates a `values` array. Numeric strings are accepted so values
/// produced by templates still add up.
pub struct ComputeTool;

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render whole floats as integers so `{"total": 42}` stays an integer
fn to_json_number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

#[async_trait]
impl Tool for ComputeTool {
    fn name(&self) -> &str {
        "compute"
    }

    fn description(&self) -> &str {
        "Aggregate a list of numbers. Actions: sum, product, count."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "values": { "type": "array", "items": { "type": "number" } }
            },
            "required": ["values"]
        })
    }

    fn actions(&self) -> Vec<String> {
        vec!["sum".to_string(), "product".to_string(), "count".to_string()]
    }

    async fn execute(&self, action: &str, input: Value) -> Result<Value> {
        let values = input
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow!("'values' must be an array"))?;

        let numbers = values
            .iter()
            .map(|v| as_number(v).ok_or_else(|| anyhow!("not a number: {}", v)))
            .collect::<Result<Vec<f64>>>()?;

        let total = match action {
            "sum" => numbers.iter().sum(),
            "product" => numbers.iter().product(),
            "count" => numbers.len() as f64,
            other => bail!("unsupported action: {}", other),
        };

        Ok(json!({ "total": to_json_number(total), "count": numbers.len() }))
    }

    fn category(&self) -> &str {
        "math"
    }
}

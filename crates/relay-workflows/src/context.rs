//! Result Context - per-run scratch of prior step outputs
//!
//! Rebuilt from the recorded step results at the start of every execute
//! call, then extended as steps complete. Only successful results are
//! visible to parameter resolution.

use serde_json::Value;
use std::collections::HashMap;

use crate::plan::WorkflowPlan;
use crate::step::StepStatus;

#[derive(Debug, Clone, Default)]
pub struct ResultContext {
    results: HashMap<String, Value>,
}

impl ResultContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the data of every completed step in `plan`
    pub fn from_plan(plan: &WorkflowPlan) -> Self {
        let results = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| {
                s.result()
                    .filter(|r| r.success)
                    .map(|r| (s.id.clone(), r.data.clone()))
            })
            .collect();
        Self { results }
    }

    pub fn record(&mut self, step_id: &str, data: Value) {
        self.results.insert(step_id.to_string(), data);
    }

    /// Output data of a completed step
    pub fn get(&self, step_id: &str) -> Option<&Value> {
        self.results.get(step_id)
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.results.contains_key(step_id)
    }

    /// Resolve `path` inside a step's data
    pub fn lookup(&self, step_id: &str, path: &str) -> Option<&Value> {
        self.get(step_id).and_then(|data| lookup_path(data, path))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Walk a dotted path; numeric segments index arrays.
///
/// An empty path returns the value itself.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

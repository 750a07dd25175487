//! Per-tool parameter adapters
//!
//! Generic directive resolution covers most steps. Tools whose inputs need
//! reshaping register an adapter here, keyed by tool name; it runs on the
//! generically resolved parameters right before dispatch.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::ResultContext;
use crate::step::WorkflowStep;

/// Reshapes resolved parameters for one tool
pub trait ParamAdapter: Send + Sync {
    fn adapt(
        &self,
        params: Map<String, Value>,
        step: &WorkflowStep,
        results: &ResultContext,
    ) -> Map<String, Value>;
}

impl<F> ParamAdapter for F
where
    F: Fn(Map<String, Value>, &WorkflowStep, &ResultContext) -> Map<String, Value> + Send + Sync,
{
    fn adapt(
        &self,
        params: Map<String, Value>,
        step: &WorkflowStep,
        results: &ResultContext,
    ) -> Map<String, Value> {
        self(params, step, results)
    }
}

/// Forwards the untouched output of the `source` step as `content`.
///
/// Oracle input and logs only ever see elided payloads; the display tool
/// must get the original bytes.
pub struct DisplayAdapter;

impl ParamAdapter for DisplayAdapter {
    fn adapt(
        &self,
        mut params: Map<String, Value>,
        _step: &WorkflowStep,
        results: &ResultContext,
    ) -> Map<String, Value> {
        if params.contains_key("content") {
            return params;
        }
        let original = params
            .get("source")
            .and_then(|v| v.as_str())
            .and_then(|source| results.get(source))
            .cloned();
        if let Some(content) = original {
            params.insert("content".to_string(), content);
        }
        params
    }
}

/// Fills a missing or blank text parameter from the step description,
/// or the title when there is no description.
pub struct DescriptionFallback {
    param: String,
}

impl DescriptionFallback {
    pub fn new(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
        }
    }
}

impl ParamAdapter for DescriptionFallback {
    fn adapt(
        &self,
        mut params: Map<String, Value>,
        step: &WorkflowStep,
        _results: &ResultContext,
    ) -> Map<String, Value> {
        let blank = match params.get(&self.param) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        };
        if blank {
            let text = if step.description.trim().is_empty() {
                step.title.clone()
            } else {
                step.description.clone()
            };
            params.insert(self.param.clone(), Value::String(text));
        }
        params
    }
}

/// Adapters keyed by tool name
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ParamAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the adapters for the built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("display", DisplayAdapter);
        registry.register("ask_user", DescriptionFallback::new("question"));
        registry
    }

    /// Register an adapter, replacing any previous one for the tool
    pub fn register(&mut self, tool_name: impl Into<String>, adapter: impl ParamAdapter + 'static) {
        self.adapters.insert(tool_name.into(), Arc::new(adapter));
    }

    pub fn has(&self, tool_name: &str) -> bool {
        self.adapters.contains_key(tool_name)
    }

    pub fn apply(
        &self,
        params: Map<String, Value>,
        step: &WorkflowStep,
        results: &ResultContext,
    ) -> Map<String, Value> {
        match self.adapters.get(&step.tool_name) {
            Some(adapter) => adapter.adapt(params, step, results),
            None => params,
        }
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tools: Vec<&String> = self.adapters.keys().collect();
        tools.sort();
        f.debug_struct("AdapterRegistry").field("tools", &tools).finish()
    }
}

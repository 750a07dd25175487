//! Parameter resolution
//!
//! Declared parameters may pull values from earlier steps:
//!
//! - `"<ref STEP.PATH>"` - whole value of a prior result field
//! - `{"$ref": "STEP.PATH", "default": V}` - same, with a fallback
//! - `{"$template": "...", "default": V}` - explicit template
//! - any string with `{SOURCE.PATH}` placeholders
//!
//! `SOURCE` is a step id, `#N` (1-based plan position), `prev` (nearest
//! earlier completed step) or `workflow` (plan fields and metadata).
//! Braces naming anything else are left as written. A directive that
//! cannot be satisfied takes its default or is dropped.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::adapters::AdapterRegistry;
use crate::context::{lookup_path, ResultContext};
use crate::plan::WorkflowPlan;

lazy_static! {
    static ref REF_DIRECTIVE: Regex = Regex::new(r"^<ref\s+([^\s<>]+)\s*>$").unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z0-9_#][A-Za-z0-9_.#-]*)\}").unwrap();
}

/// Outcome of looking up one `SOURCE.PATH` expression
#[derive(Debug, Clone, PartialEq)]
enum Lookup {
    Found(Value),
    /// Source exists but has no usable value at that path
    Missing,
    /// Not a source at all
    Unknown,
}

/// Everything resolution may read for the step at `index`
struct Scope<'a> {
    plan: &'a WorkflowPlan,
    index: usize,
    results: &'a ResultContext,
}

impl<'a> Scope<'a> {
    fn workflow_value(&self) -> Value {
        json!({
            "id": self.plan.id,
            "title": self.plan.title,
            "description": self.plan.description,
            "owner_id": self.plan.owner_id,
            "conversation_id": self.plan.conversation_id,
            "metadata": self.plan.metadata,
        })
    }

    fn step_data(&self, step_id: &str, path: &str) -> Lookup {
        match self.results.lookup(step_id, path) {
            Some(v) => Lookup::Found(v.clone()),
            None => Lookup::Missing,
        }
    }

    fn lookup(&self, expr: &str) -> Lookup {
        let (source, path) = expr.split_once('.').unwrap_or((expr, ""));

        if source == "workflow" {
            return match lookup_path(&self.workflow_value(), path) {
                Some(v) => Lookup::Found(v.clone()),
                None => Lookup::Missing,
            };
        }

        if source == "prev" {
            let earlier = &self.plan.steps[..self.index.min(self.plan.steps.len())];
            return match earlier.iter().rev().find(|s| self.results.contains(&s.id)) {
                Some(step) => self.step_data(&step.id, path),
                None => Lookup::Missing,
            };
        }

        if let Some(position) = source.strip_prefix('#') {
            return match position.parse::<usize>() {
                Ok(n) if n >= 1 && n <= self.plan.steps.len() => {
                    self.step_data(&self.plan.steps[n - 1].id, path)
                }
                _ => Lookup::Unknown,
            };
        }

        if self.plan.step(source).is_some() {
            return self.step_data(source, path);
        }
        Lookup::Unknown
    }

    fn render_template(&self, template: &str) -> Option<Value> {
        // A lone placeholder keeps the referenced value's JSON type
        if let Some(caps) = PLACEHOLDER.captures(template) {
            if caps.get(0).map(|m| m.as_str().len()) == Some(template.len()) {
                return match self.lookup(&caps[1]) {
                    Lookup::Found(v) => Some(v),
                    Lookup::Missing => None,
                    Lookup::Unknown => Some(Value::String(template.to_string())),
                };
            }
        }

        let mut unresolved = false;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            match self.lookup(&caps[1]) {
                Lookup::Found(Value::String(s)) => s,
                Lookup::Found(other) => other.to_string(),
                Lookup::Missing => {
                    unresolved = true;
                    String::new()
                }
                Lookup::Unknown => caps[0].to_string(),
            }
        });
        if unresolved {
            None
        } else {
            Some(Value::String(rendered.into_owned()))
        }
    }

    fn resolve_directive_object(&self, map: &Map<String, Value>) -> Option<Option<Value>> {
        let only_directive_keys = |key: &str| {
            map.keys()
                .all(|k| k == key || k == "default")
        };

        if let Some(Value::String(expr)) = map.get("$ref") {
            if only_directive_keys("$ref") {
                let resolved = match self.lookup(expr) {
                    Lookup::Found(v) => Some(v),
                    _ => None,
                };
                return Some(resolved.or_else(|| map.get("default").cloned()));
            }
        }
        if let Some(Value::String(template)) = map.get("$template") {
            if only_directive_keys("$template") {
                return Some(
                    self.render_template(template)
                        .or_else(|| map.get("default").cloned()),
                );
            }
        }
        None
    }

    /// `None` means unresolved with no default
    fn resolve_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(s) => {
                if let Some(caps) = REF_DIRECTIVE.captures(s) {
                    return match self.lookup(&caps[1]) {
                        Lookup::Found(v) => Some(v),
                        _ => None,
                    };
                }
                if s.contains('{') {
                    return self.render_template(s);
                }
                Some(value.clone())
            }
            Value::Object(map) => {
                if let Some(directive) = self.resolve_directive_object(map) {
                    return directive;
                }
                let resolved = map
                    .iter()
                    .filter_map(|(k, v)| self.resolve_value(v).map(|v| (k.clone(), v)))
                    .collect();
                Some(Value::Object(resolved))
            }
            Value::Array(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v).unwrap_or(Value::Null))
                    .collect(),
            )),
            other => Some(other.clone()),
        }
    }
}

/// Resolve the declared parameters of the step at `index` without adapters
pub fn resolve_params(
    plan: &WorkflowPlan,
    index: usize,
    results: &ResultContext,
) -> Map<String, Value> {
    let Some(step) = plan.steps.get(index) else {
        return Map::new();
    };
    let scope = Scope {
        plan,
        index,
        results,
    };

    let mut resolved = Map::new();
    for (key, value) in &step.params {
        match scope.resolve_value(value) {
            Some(v) => {
                resolved.insert(key.clone(), v);
            }
            None => debug!(
                "Step '{}': parameter '{}' unresolved, omitting",
                step.id, key
            ),
        }
    }
    resolved
}

/// Directive resolution followed by the tool's adapter, if any
#[derive(Debug, Clone, Default)]
pub struct ParamResolver {
    adapters: AdapterRegistry,
}

impl ParamResolver {
    pub fn new(adapters: AdapterRegistry) -> Self {
        Self { adapters }
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn resolve(
        &self,
        plan: &WorkflowPlan,
        index: usize,
        results: &ResultContext,
    ) -> Map<String, Value> {
        let params = resolve_params(plan, index, results);
        match plan.steps.get(index) {
            Some(step) => self.adapters.apply(params, step, results),
            None => params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepSpec;
    use relay_core::ToolResult;

    /// Plan whose first steps already completed with the given data
    fn plan_with(done: &[(&str, Value)], next: StepSpec) -> (WorkflowPlan, ResultContext) {
        let mut specs: Vec<StepSpec> = done
            .iter()
            .map(|(id, _)| StepSpec::new("echo", "run").with_id(*id))
            .collect();
        specs.push(next.with_id("target"));
        let mut plan = WorkflowPlan::from_specs(specs, "owner-1", "conv")
            .unwrap()
            .with_title("Demo");
        for (i, (_, data)) in done.iter().enumerate() {
            plan.steps[i].record_result(ToolResult::success(data.clone()));
            plan.advance();
        }
        let results = ResultContext::from_plan(&plan);
        (plan, results)
    }

    fn resolve(done: &[(&str, Value)], params: Value) -> Map<String, Value> {
        let mut spec = StepSpec::new("echo", "run");
        spec.params = params.as_object().cloned().unwrap();
        let (plan, results) = plan_with(done, spec);
        let index = plan.steps.len() - 1;
        resolve_params(&plan, index, &results)
    }

    #[test]
    fn test_ref_string_keeps_type() {
        let out = resolve(
            &[("calc", json!({"total": 42}))],
            json!({"n": "<ref calc.total>"}),
        );
        assert_eq!(out["n"], json!(42));
    }

    #[test]
    fn test_ref_object_default() {
        let out = resolve(
            &[("calc", json!({"total": 42}))],
            json!({
                "a": {"$ref": "calc.missing", "default": 0},
                "b": {"$ref": "calc.missing"}
            }),
        );
        assert_eq!(out["a"], json!(0));
        assert!(!out.contains_key("b"));
    }

    #[test]
    fn test_template_placeholders() {
        let out = resolve(
            &[("calc", json!({"total": 42})), ("who", json!({"name": "Ada"}))],
            json!({
                "text": "{who.name} got {calc.total}",
                "positional": "{#1.total}",
                "previous": "{prev.name}",
                "title": "{workflow.title}"
            }),
        );
        assert_eq!(out["text"], json!("Ada got 42"));
        assert_eq!(out["positional"], json!(42));
        assert_eq!(out["previous"], json!("Ada"));
        assert_eq!(out["title"], json!("Demo"));
    }

    #[test]
    fn test_unknown_braces_left_alone() {
        let out = resolve(
            &[("calc", json!({"total": 1}))],
            json!({"code": "fn main() {body}", "json": "{\"k\": 1}"}),
        );
        assert_eq!(out["code"], json!("fn main() {body}"));
        assert_eq!(out["json"], json!("{\"k\": 1}"));
    }

    #[test]
    fn test_unresolved_template_uses_default_or_is_dropped() {
        let out = resolve(
            &[("calc", json!({"total": 1}))],
            json!({
                "a": {"$template": "value {calc.nope}", "default": "fallback"},
                "b": "value {calc.nope}"
            }),
        );
        assert_eq!(out["a"], json!("fallback"));
        assert!(!out.contains_key("b"));
    }

    #[test]
    fn test_nested_values_resolved() {
        let out = resolve(
            &[("calc", json!({"items": [10, 20]}))],
            json!({
                "outer": {"first": "<ref calc.items.0>", "gone": "<ref calc.x>"},
                "list": ["<ref calc.items.1>", "<ref calc.x>", 3]
            }),
        );
        assert_eq!(out["outer"], json!({"first": 10}));
        assert_eq!(out["list"], json!([20, null, 3]));
    }

    #[test]
    fn test_reference_to_unrun_step_is_unresolved() {
        let specs = vec![
            StepSpec::new("echo", "run")
                .with_id("early")
                .with_param("x", json!("<ref late.value>")),
            StepSpec::new("echo", "run").with_id("late"),
        ];
        let plan = WorkflowPlan::from_specs(specs, "o", "c").unwrap();
        let out = resolve_params(&plan, 0, &ResultContext::new());
        assert!(out.is_empty());
    }

    #[test]
    fn test_resolver_applies_adapter() {
        let image = json!("data:image/png;base64,AAAA");
        let spec = StepSpec::new("display", "show").with_param("source", json!("render"));
        let (plan, results) = plan_with(&[("render", image.clone())], spec);
        let resolver = ParamResolver::new(AdapterRegistry::with_builtins());
        let out = resolver.resolve(&plan, 1, &results);
        assert_eq!(out["content"], image);
        assert_eq!(out["source"], json!("render"));
    }
}

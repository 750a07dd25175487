//! Workflow Step - one tool invocation inside a plan
//!
//! A step moves forward through its lifecycle and never back:
//! - `Pending` until the cursor reaches it
//! - `Running` while its tool call is in flight
//! - `RequiresApproval` while a human decision is outstanding
//! - `Completed`, `Failed` or `Skipped` once settled

use chrono::{DateTime, Utc};
use relay_core::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};

/// Source names the parameter resolver reserves for itself
pub const RESERVED_STEP_IDS: &[&str] = &["prev", "workflow"];

/// State of a workflow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for the cursor
    #[default]
    Pending,
    /// Tool call in flight
    Running,
    /// Tool call returned success
    Completed,
    /// Tool call failed or dependencies were not met
    Failed,
    /// Never ran (workflow halted or cancelled first)
    Skipped,
    /// Awaiting a human decision
    RequiresApproval,
}

impl StepStatus {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::RequiresApproval => "requires_approval",
        }
    }
}

fn default_critical() -> bool {
    true
}

/// Declarative description of a step, as submitted by a planner or
/// proposed by the oracle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSpec {
    /// Optional caller-chosen id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "tool")]
    pub tool_name: String,
    #[serde(default, alias = "action")]
    pub action_name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Ids of steps that must complete before this one runs
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub requires_user_input: bool,
    /// Whether a tool failure in this step halts the workflow
    #[serde(default = "default_critical")]
    pub critical: bool,
    /// Per-call tool timeout; the dispatcher default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl StepSpec {
    pub fn new(tool_name: impl Into<String>, action_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            action_name: action_name.into(),
            critical: true,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    pub fn requiring_user_input(mut self) -> Self {
        self.requires_user_input = true;
        self
    }

    pub fn non_critical(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    fn check_fields(&self, position: usize) -> EngineResult<()> {
        let label = self
            .id
            .as_deref()
            .map(|id| format!("step '{}'", id))
            .unwrap_or_else(|| format!("step #{}", position + 1));

        if self.tool_name.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "{} is missing a tool name",
                label
            )));
        }
        if self.action_name.trim().is_empty() {
            return Err(EngineError::validation(format!(
                "{} is missing an action name",
                label
            )));
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(EngineError::validation(format!("{} has an empty id", label)));
            }
            if id.starts_with('#') || RESERVED_STEP_IDS.contains(&id.as_str()) {
                return Err(EngineError::validation(format!(
                    "step id '{}' is reserved",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Validate a batch of step specs.
///
/// `known_ids` holds ids that already exist (empty for a fresh plan). Ids
/// must be unique within the batch and every dependency must name a known
/// id or another step of the batch.
pub fn validate_specs(specs: &[StepSpec], known_ids: &HashSet<String>) -> EngineResult<()> {
    let mut batch_ids = HashSet::new();
    for (position, spec) in specs.iter().enumerate() {
        spec.check_fields(position)?;
        if let Some(id) = &spec.id {
            if !batch_ids.insert(id.clone()) {
                return Err(EngineError::validation(format!(
                    "duplicate step id '{}'",
                    id
                )));
            }
        }
    }

    for spec in specs {
        for dep in &spec.dependencies {
            if !batch_ids.contains(dep) && !known_ids.contains(dep) {
                return Err(EngineError::validation(format!(
                    "step '{}' depends on unknown step '{}'",
                    spec.id.as_deref().unwrap_or(&spec.tool_name),
                    dep
                )));
            }
        }
    }
    Ok(())
}

/// A step inside a registered plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tool_name: String,
    pub action_name: String,
    /// Declared parameters, directives unresolved
    pub params: Map<String, Value>,
    pub dependencies: Vec<String>,
    pub status: StepStatus,
    pub requires_user_input: bool,
    pub critical: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Submitted step this one descends from. Oracle-inserted steps inherit
    /// it and share its consultation budget.
    #[serde(default)]
    pub lineage: String,
    result: Option<ToolResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn from_spec(spec: StepSpec, id: String) -> Self {
        let title = if spec.title.is_empty() {
            format!("{}.{}", spec.tool_name, spec.action_name)
        } else {
            spec.title
        };
        Self {
            lineage: id.clone(),
            id,
            title,
            description: spec.description,
            tool_name: spec.tool_name,
            action_name: spec.action_name,
            params: spec.params,
            dependencies: spec.dependencies,
            status: StepStatus::Pending,
            requires_user_input: spec.requires_user_input,
            critical: spec.critical,
            timeout_ms: spec.timeout_ms,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Tool call for this step with already-resolved parameters
    pub fn tool_call(&self, params: Map<String, Value>) -> ToolCall {
        let call = ToolCall::new(&self.tool_name, &self.action_name, params);
        match self.timeout_ms {
            Some(timeout_ms) => call.with_timeout_ms(timeout_ms),
            None => call,
        }
    }

    /// Recorded outcome, set at most once
    pub fn result(&self) -> Option<&ToolResult> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<String> {
        self.result
            .as_ref()
            .filter(|r| !r.success)
            .map(|r| r.error_message())
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn await_decision(&mut self) {
        self.status = StepStatus::RequiresApproval;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Record the outcome and settle the step.
    ///
    /// Returns `false` without touching anything when a result is
    /// already present.
    pub fn record_result(&mut self, result: ToolResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn fail_with(&mut self, message: impl Into<String>) -> bool {
        self.record_result(ToolResult::error(message))
    }

    pub fn skip(&mut self) {
        if !self.status.is_settled() {
            self.status = StepStatus::Skipped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_is_set_once() {
        let mut step = WorkflowStep::from_spec(StepSpec::new("echo", "run"), "a".into());
        assert!(step.record_result(ToolResult::success(json!({"n": 1}))));
        assert_eq!(step.status, StepStatus::Completed);

        assert!(!step.record_result(ToolResult::error("late")));
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.result().map(|r| r.data.clone()), Some(json!({"n": 1})));
    }

    #[test]
    fn test_skip_leaves_settled_steps_alone() {
        let mut step = WorkflowStep::from_spec(StepSpec::new("echo", "run"), "a".into());
        step.fail_with("boom");
        step.skip();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error_message().as_deref(), Some("boom"));
    }

    #[test]
    fn test_spec_deserializes_with_aliases() {
        let spec: StepSpec = serde_json::from_value(json!({
            "id": "fetch",
            "tool": "echo",
            "action": "run",
            "params": {"x": 1}
        }))
        .unwrap();
        assert_eq!(spec.tool_name, "echo");
        assert_eq!(spec.action_name, "run");
        assert!(spec.critical);
    }

    #[test]
    fn test_validate_specs() {
        let known = HashSet::new();
        assert!(validate_specs(&[StepSpec::new("echo", "run").with_id("a")], &known).is_ok());

        let err = validate_specs(&[StepSpec::new("", "run")], &known).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = validate_specs(&[StepSpec::new("echo", "")], &known).unwrap_err();
        assert!(err.to_string().contains("action"));

        let dupes = [
            StepSpec::new("echo", "run").with_id("a"),
            StepSpec::new("echo", "run").with_id("a"),
        ];
        assert!(validate_specs(&dupes, &known).is_err());

        let dangling = [StepSpec::new("echo", "run").with_id("a").depends_on("zzz")];
        assert!(validate_specs(&dangling, &known).is_err());

        let reserved = [StepSpec::new("echo", "run").with_id("prev")];
        assert!(validate_specs(&reserved, &known).is_err());
    }

    #[test]
    fn test_forward_dependency_is_structurally_valid() {
        // Ordering problems are left to the runtime dependency check
        let specs = [
            StepSpec::new("echo", "run").with_id("a").depends_on("b"),
            StepSpec::new("echo", "run").with_id("b"),
        ];
        assert!(validate_specs(&specs, &HashSet::new()).is_ok());
    }
}

//! Workflow Plan - ordered steps plus an execution cursor
//!
//! A plan is strictly linear: the step at `current_step_index` is the next
//! one to run, everything before it has settled and everything after it is
//! still pending. Re-planning only ever inserts at the cursor, so settled
//! history is never rewritten.

use chrono::{DateTime, Utc};
use relay_core::ToolResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::step::{validate_specs, StepSpec, StepStatus, WorkflowStep};

/// Overall workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Registered, never executed
    #[default]
    Planning,
    Running,
    /// Stopped by the oracle; the next execute picks up at the cursor
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outstanding human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub decision_id: String,
    pub step_id: String,
    /// Question posed by the clarification call, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Option set returned by the clarification call
    pub options: Value,
    pub requested_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn from_clarification(step_id: &str, clarification: &ToolResult) -> Self {
        let question = clarification
            .data
            .get("question")
            .and_then(|v| v.as_str())
            .map(String::from);
        let options = clarification
            .data
            .get("options")
            .cloned()
            .unwrap_or_else(|| json!([]));
        Self {
            decision_id: Uuid::new_v4().to_string(),
            step_id: step_id.to_string(),
            question,
            options,
            requested_at: Utc::now(),
        }
    }

    /// Whether `choice` is acceptable for this decision.
    ///
    /// A non-empty option list of strings restricts string choices to
    /// that list; anything else is accepted as free-form input.
    pub fn accepts(&self, choice: &Value) -> bool {
        let allowed: Vec<&str> = match self.options.as_array() {
            Some(items) if !items.is_empty() => items.iter().filter_map(|v| v.as_str()).collect(),
            _ => return true,
        };
        match choice.as_str() {
            Some(choice) if !allowed.is_empty() => allowed.contains(&choice),
            _ => true,
        }
    }
}

/// A registered workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub conversation_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    /// Index of the next step to run; `steps.len()` once exhausted
    pub current_step_index: usize,
    pub metadata: Map<String, Value>,
    pub pending_decision: Option<PendingDecision>,
    /// Steps spliced in by the oracle so far
    #[serde(default)]
    pub inserted_steps: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pick `base` or the first free `base-N`
fn unique_id(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{}-{}", base, Uuid::new_v4()))
}

impl WorkflowPlan {
    /// Build a plan from validated specs. Steps without an id get `step-N`.
    pub fn from_specs(
        specs: Vec<StepSpec>,
        owner_id: impl Into<String>,
        conversation_id: impl Into<String>,
    ) -> EngineResult<Self> {
        if specs.is_empty() {
            return Err(EngineError::validation("plan has no steps"));
        }
        validate_specs(&specs, &HashSet::new())?;

        let mut taken: HashSet<String> = specs.iter().filter_map(|s| s.id.clone()).collect();
        let mut steps = Vec::with_capacity(specs.len());
        for (index, mut spec) in specs.into_iter().enumerate() {
            let id = match spec.id.take() {
                Some(id) => id,
                None => {
                    let id = unique_id(&format!("step-{}", index + 1), &taken);
                    taken.insert(id.clone());
                    id
                }
            };
            steps.push(WorkflowStep::from_spec(spec, id));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title: String::new(),
            description: String::new(),
            owner_id: owner_id.into(),
            conversation_id: conversation_id.into(),
            status: WorkflowStatus::Planning,
            steps,
            current_step_index: 0,
            metadata: Map::new(),
            pending_decision: None,
            inserted_steps: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_step_index >= self.steps.len()
    }

    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps.get(self.current_step_index)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn step_ids(&self) -> HashSet<String> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    pub fn advance(&mut self) {
        if self.current_step_index < self.steps.len() {
            self.current_step_index += 1;
        }
        self.touch();
    }

    /// Check whether the step at `index` may run.
    ///
    /// Every earlier step and every declared dependency must have
    /// completed. The error names the first offender.
    pub fn dependencies_met(&self, index: usize) -> Result<(), String> {
        let step = self
            .steps
            .get(index)
            .ok_or_else(|| format!("no step at index {}", index))?;

        if let Some(earlier) = self.steps[..index]
            .iter()
            .find(|s| s.status != StepStatus::Completed)
        {
            return Err(format!(
                "earlier step '{}' is {}",
                earlier.id,
                earlier.status.as_str()
            ));
        }

        for dep in &step.dependencies {
            match self.step(dep) {
                Some(s) if s.status == StepStatus::Completed => {}
                Some(s) => {
                    return Err(format!(
                        "dependency '{}' is {}",
                        dep,
                        s.status.as_str()
                    ))
                }
                None => return Err(format!("dependency '{}' does not exist", dep)),
            }
        }
        Ok(())
    }

    /// Insert steps at the cursor, ahead of the remaining pending steps.
    ///
    /// Ids colliding with existing steps are re-keyed `<id>-N`; dependencies
    /// between inserted steps follow the renames. The new steps take the
    /// lineage of `parent`. Returns the ids actually used, in order.
    pub fn insert_at_cursor(
        &mut self,
        specs: Vec<StepSpec>,
        parent: &str,
    ) -> EngineResult<Vec<String>> {
        if specs.is_empty() {
            return Ok(Vec::new());
        }
        let existing = self.step_ids();
        validate_specs(&specs, &existing)?;
        let lineage = self
            .step(parent)
            .map(|s| s.lineage.clone())
            .unwrap_or_else(|| parent.to_string());

        let mut taken = existing;
        let mut renames: HashMap<String, String> = HashMap::new();
        let mut assigned = Vec::with_capacity(specs.len());
        for spec in &specs {
            let base = spec
                .id
                .clone()
                .unwrap_or_else(|| format!("{}-{}", spec.tool_name, spec.action_name));
            let id = unique_id(&base, &taken);
            taken.insert(id.clone());
            if let Some(original) = &spec.id {
                if original != &id {
                    renames.insert(original.clone(), id.clone());
                }
            }
            assigned.push(id);
        }

        let batch_ids: HashSet<String> = specs.iter().filter_map(|s| s.id.clone()).collect();
        let new_steps: Vec<WorkflowStep> = specs
            .into_iter()
            .zip(assigned.iter())
            .map(|(mut spec, id)| {
                spec.dependencies = spec
                    .dependencies
                    .into_iter()
                    .map(|dep| match renames.get(&dep) {
                        Some(renamed) if batch_ids.contains(&dep) => renamed.clone(),
                        _ => dep,
                    })
                    .collect();
                let mut step = WorkflowStep::from_spec(spec, id.clone());
                step.lineage = lineage.clone();
                step
            })
            .collect();

        let at = self.current_step_index.min(self.steps.len());
        self.steps.splice(at..at, new_steps);
        self.inserted_steps += assigned.len();
        self.touch();
        Ok(assigned)
    }

    /// Mark every unsettled step from the cursor on as skipped
    pub fn skip_remaining(&mut self) {
        let from = self.current_step_index.min(self.steps.len());
        for step in &mut self.steps[from..] {
            step.skip();
        }
        self.touch();
    }

    /// First failed step and its message
    pub fn first_failure(&self) -> Option<(&str, String)> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .map(|s| {
                (
                    s.id.as_str(),
                    s.error_message()
                        .unwrap_or_else(|| "step failed".to_string()),
                )
            })
    }

    /// Status once every step has been attempted
    pub fn settled_status(&self) -> WorkflowStatus {
        if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        }
    }

    /// Read-only view for progress sinks and status queries
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let failure = self.first_failure();
        WorkflowSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            owner_id: self.owner_id.clone(),
            conversation_id: self.conversation_id.clone(),
            status: self.status,
            current_step_index: self.current_step_index,
            total_steps: self.steps.len(),
            steps: self.steps.iter().map(StepSnapshot::from).collect(),
            failed_step_id: failure.as_ref().map(|(id, _)| id.to_string()),
            error: failure.map(|(_, msg)| msg),
            pending_decision: self.pending_decision.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable view of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: String,
    pub title: String,
    pub tool_name: String,
    pub action_name: String,
    pub status: StepStatus,
    pub requires_user_input: bool,
    pub critical: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&WorkflowStep> for StepSnapshot {
    fn from(step: &WorkflowStep) -> Self {
        Self {
            id: step.id.clone(),
            title: step.title.clone(),
            tool_name: step.tool_name.clone(),
            action_name: step.action_name.clone(),
            status: step.status,
            requires_user_input: step.requires_user_input,
            critical: step.critical,
            result: step.result().cloned(),
            error: step.error_message(),
            started_at: step.started_at,
            completed_at: step.completed_at,
        }
    }
}

/// Serializable view of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner_id: String,
    pub conversation_id: String,
    pub status: WorkflowStatus,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub steps: Vec<StepSnapshot>,
    pub failed_step_id: Option<String>,
    pub error: Option<String>,
    pub pending_decision: Option<PendingDecision>,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    pub fn step(&self, step_id: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }
}

//! Reasoning oracle contract
//!
//! After each successful step the engine may ask an external reasoner
//! whether the workflow should carry on and whether extra steps should be
//! inserted ahead of the remaining ones. The oracle only ever sees elided
//! payloads.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::elide_payloads;
use crate::plan::{WorkflowPlan, WorkflowStatus};
use crate::step::{StepSpec, StepStatus, WorkflowStep};

/// What the oracle is told about the step that just ran
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSummary {
    pub step_id: String,
    pub index: usize,
    pub title: String,
    pub description: String,
    pub tool_name: String,
    pub action_name: String,
    pub success: bool,
    /// Result data with large payloads elided
    pub data: Value,
    pub error: Option<String>,
}

impl StepSummary {
    pub fn from_step(step: &WorkflowStep, index: usize, elide_threshold: usize) -> Self {
        let result = step.result();
        Self {
            step_id: step.id.clone(),
            index,
            title: step.title.clone(),
            description: step.description.clone(),
            tool_name: step.tool_name.clone(),
            action_name: step.action_name.clone(),
            success: result.map(|r| r.success).unwrap_or(false),
            data: result
                .map(|r| elide_payloads(&r.data, elide_threshold))
                .unwrap_or(Value::Null),
            error: step.error_message(),
        }
    }
}

/// Compact description of a step that has not run yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemainingStep {
    pub step_id: String,
    pub title: String,
    pub tool_name: String,
    pub action_name: String,
}

/// What the oracle is told about the workflow as a whole
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub title: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub current_step_index: usize,
    pub total_steps: usize,
    pub completed_step_ids: Vec<String>,
    pub remaining: Vec<RemainingStep>,
}

impl WorkflowSummary {
    pub fn from_plan(plan: &WorkflowPlan) -> Self {
        let from = plan.current_step_index.min(plan.steps.len());
        Self {
            workflow_id: plan.id.clone(),
            title: plan.title.clone(),
            description: plan.description.clone(),
            status: plan.status,
            current_step_index: plan.current_step_index,
            total_steps: plan.steps.len(),
            completed_step_ids: plan
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .map(|s| s.id.clone())
                .collect(),
            remaining: plan.steps[from..]
                .iter()
                .map(|s| RemainingStep {
                    step_id: s.id.clone(),
                    title: s.title.clone(),
                    tool_name: s.tool_name.clone(),
                    action_name: s.action_name.clone(),
                })
                .collect(),
        }
    }
}

fn yes() -> bool {
    true
}

/// The oracle's verdict on a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Advisory only; a `false` here is recorded, not acted upon
    #[serde(default = "yes")]
    pub step_successful: bool,
    /// `false` pauses the workflow after this step
    #[serde(default = "yes")]
    pub should_continue: bool,
    #[serde(default)]
    pub modify: bool,
    /// Insertions are applied only when this is also set
    #[serde(default)]
    pub safe_to_modify: bool,
    #[serde(default)]
    pub inserted_steps: Vec<StepSpec>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Default for Judgment {
    fn default() -> Self {
        Self::proceed()
    }
}

impl Judgment {
    /// Carry on unchanged
    pub fn proceed() -> Self {
        Self {
            step_successful: true,
            should_continue: true,
            modify: false,
            safe_to_modify: false,
            inserted_steps: Vec::new(),
            reasoning: None,
        }
    }

    /// Carry on after inserting `steps` at the cursor
    pub fn insert(steps: Vec<StepSpec>) -> Self {
        Self {
            modify: true,
            safe_to_modify: true,
            inserted_steps: steps,
            ..Self::proceed()
        }
    }

    /// Stop after this step
    pub fn pause(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reasoning: Some(reason.into()),
            ..Self::proceed()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn wants_insertion(&self) -> bool {
        self.modify && self.safe_to_modify && !self.inserted_steps.is_empty()
    }
}

/// External reasoner consulted between steps
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn evaluate(&self, step: &StepSummary, workflow: &WorkflowSummary) -> Result<Judgment>;
}

/// Oracle that never changes anything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllOracle;

#[async_trait]
impl ReasoningOracle for AcceptAllOracle {
    async fn evaluate(&self, _step: &StepSummary, _workflow: &WorkflowSummary) -> Result<Judgment> {
        Ok(Judgment::proceed())
    }
}

//! Workflow Engine - drives registered plans one step at a time
//!
//! The engine manages workflow execution:
//! - One executor per workflow, enforced by a non-blocking try-lock
//! - Strict sequential steps with fail-forward dependency checks
//! - Parameter resolution against prior results
//! - Oracle consultation and insert-at-cursor re-planning
//! - Pausing for human decisions and resuming from them
//! - Progress notifications to the configured sink

use relay_core::{ToolCall, ToolDispatch, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::adapters::AdapterRegistry;
use crate::config::EngineConfig;
use crate::context::ResultContext;
use crate::error::{EngineError, EngineResult};
use crate::oracle::{ReasoningOracle, StepSummary, WorkflowSummary};
use crate::plan::{PendingDecision, StepSnapshot, WorkflowPlan, WorkflowSnapshot, WorkflowStatus};
use crate::progress::{NullProgressSink, ProgressSink};
use crate::registry::{ExecutionGuard, WorkflowEntry, WorkflowRegistry};
use crate::resolver::ParamResolver;
use crate::step::StepSpec;
use crate::throttle::{Clock, EvaluationThrottle, SystemClock, ThrottleConfig, ThrottleDecision};

/// A plan as handed over by the planning collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub steps: Vec<StepSpec>,
}

/// Outcome of one execute or resume call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub workflow_id: String,
    /// Steps settled during this call
    pub steps_executed: usize,
    /// Whether the workflow is now completed
    pub success: bool,
    pub status: WorkflowStatus,
    /// The run stopped to wait for a decision
    pub requires_user_input: bool,
    pub pending_decision: Option<PendingDecision>,
    pub failed_step_id: Option<String>,
    pub error: Option<String>,
}

impl ExecutionSummary {
    fn from_plan(plan: &WorkflowPlan, steps_executed: usize) -> Self {
        let awaiting = !plan.status.is_terminal() && plan.pending_decision.is_some();
        let (failed_step_id, error) = match plan.status {
            WorkflowStatus::Failed => match plan.first_failure() {
                Some((id, msg)) => (Some(id.to_string()), Some(format!("step '{}' failed: {}", id, msg))),
                None => (None, Some("workflow failed".to_string())),
            },
            WorkflowStatus::Cancelled => (None, Some("workflow cancelled".to_string())),
            _ => (None, None),
        };
        Self {
            workflow_id: plan.id.clone(),
            steps_executed,
            success: plan.status == WorkflowStatus::Completed,
            status: plan.status,
            requires_user_input: awaiting,
            pending_decision: if awaiting {
                plan.pending_decision.clone()
            } else {
                None
            },
            failed_step_id,
            error,
        }
    }

    fn already_finished(plan: &WorkflowPlan) -> Self {
        let mut summary = Self::from_plan(plan, 0);
        summary.error = Some(format!("workflow already {}", plan.status));
        summary
    }
}

/// Why the step loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Exhausted,
    Cancelled,
    CriticalFailure,
}

/// What the oracle wants after a step
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Continue,
    Pause(Option<String>),
}

/// Work picked for the current cursor position
enum NextStep {
    /// Settled without a tool call (dependencies not met)
    Settled { index: usize, snapshot: StepSnapshot },
    /// A decision for this step is already outstanding
    Awaiting,
    Clarify {
        index: usize,
        step_id: String,
        call: ToolCall,
        snapshot: StepSnapshot,
    },
    Run {
        index: usize,
        step_id: String,
        critical: bool,
        call: ToolCall,
        snapshot: StepSnapshot,
    },
}

/// Builder for [`WorkflowEngine`]
pub struct WorkflowEngineBuilder {
    dispatch: Arc<dyn ToolDispatch>,
    oracle: Option<Arc<dyn ReasoningOracle>>,
    sink: Arc<dyn ProgressSink>,
    adapters: AdapterRegistry,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl WorkflowEngineBuilder {
    pub fn oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> WorkflowEngine {
        let throttle = EvaluationThrottle::new(
            ThrottleConfig {
                max_consultations: self.config.max_oracle_consultations,
                cooldown: self.config.oracle_cooldown,
                capacity: self.config.eval_cache_capacity,
                ttl: self.config.eval_cache_ttl,
            },
            self.clock,
        );
        WorkflowEngine {
            workflows: WorkflowRegistry::new(),
            dispatch: self.dispatch,
            oracle: self.oracle,
            sink: self.sink,
            resolver: ParamResolver::new(self.adapters),
            throttle,
            config: self.config,
        }
    }
}

/// Workflow Engine - owns the registry and runs workflows
pub struct WorkflowEngine {
    workflows: WorkflowRegistry,
    dispatch: Arc<dyn ToolDispatch>,
    oracle: Option<Arc<dyn ReasoningOracle>>,
    sink: Arc<dyn ProgressSink>,
    resolver: ParamResolver,
    throttle: EvaluationThrottle,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Engine with built-in adapters, no oracle and no progress sink
    pub fn new(dispatch: Arc<dyn ToolDispatch>) -> Self {
        Self::builder(dispatch).build()
    }

    pub fn builder(dispatch: Arc<dyn ToolDispatch>) -> WorkflowEngineBuilder {
        WorkflowEngineBuilder {
            dispatch,
            oracle: None,
            sink: Arc::new(NullProgressSink),
            adapters: AdapterRegistry::with_builtins(),
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Plan submission API
    // ------------------------------------------------------------------

    /// Validate and register a plan; returns the new workflow id
    pub async fn create_and_register(
        &self,
        steps: Vec<StepSpec>,
        owner_id: &str,
        conversation_id: &str,
    ) -> EngineResult<String> {
        self.submit_plan(
            PlanRequest {
                steps,
                ..Default::default()
            },
            owner_id,
            conversation_id,
        )
        .await
    }

    /// Register a plan with title, description and metadata
    pub async fn submit_plan(
        &self,
        request: PlanRequest,
        owner_id: &str,
        conversation_id: &str,
    ) -> EngineResult<String> {
        let plan = WorkflowPlan::from_specs(request.steps, owner_id, conversation_id)?
            .with_title(request.title)
            .with_description(request.description)
            .with_metadata(request.metadata);

        info!(
            workflow_id = %plan.id,
            owner = %owner_id,
            steps = plan.steps.len(),
            "Registering workflow"
        );
        Ok(self.workflows.insert(plan).await)
    }

    /// Run a workflow from its cursor until it finishes or pauses.
    ///
    /// Returns `AlreadyExecuting` at once, without touching the workflow,
    /// when another call holds its execution lock.
    pub async fn execute(&self, workflow_id: &str) -> EngineResult<ExecutionSummary> {
        let entry = self.entry(workflow_id).await?;
        let Some(guard) = entry.try_begin_execution() else {
            debug!(workflow_id = %workflow_id, "Execute refused, already running");
            return Err(EngineError::AlreadyExecuting(workflow_id.to_string()));
        };
        self.run(&entry, guard).await
    }

    pub async fn get_status(&self, workflow_id: &str) -> EngineResult<WorkflowSnapshot> {
        Ok(self.entry(workflow_id).await?.snapshot().await)
    }

    /// Record a human decision for the awaiting step and keep going
    pub async fn resume_with_decision(
        &self,
        workflow_id: &str,
        decision_id: &str,
        choice: Value,
    ) -> EngineResult<ExecutionSummary> {
        let entry = self.entry(workflow_id).await?;
        let Some(guard) = entry.try_begin_execution() else {
            return Err(EngineError::AlreadyExecuting(workflow_id.to_string()));
        };

        let (owner_id, index, snapshot) = {
            let mut plan = entry.write().await;
            if plan.status.is_terminal() {
                return Err(EngineError::InvalidState(format!(
                    "workflow {} is {}",
                    workflow_id, plan.status
                )));
            }
            let pending = plan.pending_decision.clone().ok_or_else(|| {
                EngineError::InvalidDecision(format!(
                    "workflow {} is not awaiting a decision",
                    workflow_id
                ))
            })?;
            if pending.decision_id != decision_id {
                return Err(EngineError::InvalidDecision(format!(
                    "unknown decision {}",
                    decision_id
                )));
            }
            if !pending.accepts(&choice) {
                return Err(EngineError::InvalidDecision(format!(
                    "choice {} is not one of {}",
                    choice, pending.options
                )));
            }
            let index = plan.index_of(&pending.step_id).ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "awaiting step {} no longer exists",
                    pending.step_id
                ))
            })?;

            let decision = ToolResult::success(json!({
                "decision_id": pending.decision_id,
                "choice": choice,
                "options": pending.options,
            }))
            .with_metadata("source", json!("user_decision"));

            let step = &mut plan.steps[index];
            step.requires_user_input = false;
            step.record_result(decision);
            let snapshot = StepSnapshot::from(&*step);

            plan.pending_decision = None;
            if plan.current_step_index == index {
                plan.advance();
            }
            info!(
                workflow_id = %workflow_id,
                step_id = %pending.step_id,
                "Decision recorded"
            );
            (plan.owner_id.clone(), index, snapshot)
        };

        self.report(
            self.sink
                .notify_step_updated(&owner_id, workflow_id, index, &snapshot),
        );
        self.run(&entry, guard).await
    }

    /// Mark a workflow cancelled.
    ///
    /// An in-flight step is not interrupted; the executor stops at its next
    /// check. Returns `false` for unknown or already finished workflows.
    ///
    /// On an idle workflow this briefly holds the execution lock, so a
    /// concurrent `execute` may get the retryable `AlreadyExecuting`.
    pub async fn cancel(&self, workflow_id: &str) -> bool {
        let Some(entry) = self.workflows.get(workflow_id).await else {
            return false;
        };
        let guard = entry.try_begin_execution();

        let (owner_id, snapshot) = {
            let mut plan = entry.write().await;
            if plan.status.is_terminal() {
                return false;
            }
            plan.status = WorkflowStatus::Cancelled;
            plan.pending_decision = None;
            plan.touch();
            info!(workflow_id = %workflow_id, "Workflow cancelled");

            if guard.is_none() {
                // The running executor settles the remaining steps
                return true;
            }
            plan.skip_remaining();
            (plan.owner_id.clone(), plan.snapshot())
        };

        self.report(self.sink.notify_workflow_completed(&owner_id, &snapshot));
        true
    }

    /// Snapshots of one owner's workflows
    pub async fn list_workflows(&self, owner_id: &str) -> Vec<WorkflowSnapshot> {
        self.workflows.list_by_owner(owner_id).await
    }

    /// Forget one workflow; refused while it executes
    pub async fn evict(&self, workflow_id: &str) -> EngineResult<bool> {
        let removed = self.workflows.remove(workflow_id).await?;
        if removed {
            self.throttle.forget_workflow(workflow_id).await;
        }
        Ok(removed)
    }

    /// Drop every idle workflow and the evaluation cache
    pub async fn clear(&self) -> usize {
        let removed = self.workflows.clear_idle().await;
        let cached = self.throttle.clear().await;
        info!(
            workflows = removed.len(),
            cache_entries = cached,
            "Cleared workflow cache"
        );
        removed.len()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    async fn entry(&self, workflow_id: &str) -> EngineResult<Arc<WorkflowEntry>> {
        self.workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| EngineError::not_found(workflow_id))
    }

    fn report(&self, outcome: anyhow::Result<()>) {
        if let Err(e) = outcome {
            warn!(error = %e, "Progress notification failed");
        }
    }

    /// The step loop. `_guard` keeps the execution lock for its duration.
    async fn run(
        &self,
        entry: &WorkflowEntry,
        _guard: ExecutionGuard,
    ) -> EngineResult<ExecutionSummary> {
        let (workflow_id, owner_id, mut results, started) = {
            let mut plan = entry.write().await;
            if plan.status.is_terminal() {
                info!(
                    workflow_id = %plan.id,
                    status = %plan.status,
                    "Execute on finished workflow, nothing to do"
                );
                return Ok(ExecutionSummary::already_finished(&plan));
            }
            let first_run = plan.status == WorkflowStatus::Planning;
            plan.status = WorkflowStatus::Running;
            plan.touch();
            (
                plan.id.clone(),
                plan.owner_id.clone(),
                ResultContext::from_plan(&plan),
                first_run.then(|| plan.snapshot()),
            )
        };

        if let Some(snapshot) = started {
            info!(workflow_id = %workflow_id, steps = snapshot.total_steps, "Starting workflow execution");
            self.report(self.sink.notify_workflow_started(&owner_id, &snapshot));
        } else {
            debug!(workflow_id = %workflow_id, "Resuming workflow execution");
        }

        let mut steps_executed = 0usize;
        let halt = loop {
            let next = {
                let mut plan = entry.write().await;
                if plan.status == WorkflowStatus::Cancelled {
                    break Halt::Cancelled;
                }
                if plan.is_exhausted() {
                    break Halt::Exhausted;
                }
                let index = plan.current_step_index;

                if let Err(reason) = plan.dependencies_met(index) {
                    let step = &mut plan.steps[index];
                    warn!(
                        workflow_id = %workflow_id,
                        step_id = %step.id,
                        "Dependencies not met: {}",
                        reason
                    );
                    step.fail_with(format!("dependencies not met: {}", reason));
                    let snapshot = StepSnapshot::from(&*step);
                    plan.advance();
                    NextStep::Settled { index, snapshot }
                } else if plan.steps[index].requires_user_input {
                    let awaiting = plan
                        .pending_decision
                        .as_ref()
                        .map(|p| p.step_id == plan.steps[index].id)
                        .unwrap_or(false);
                    if awaiting {
                        NextStep::Awaiting
                    } else {
                        let params = self.resolver.resolve(&plan, index, &results);
                        let step = &mut plan.steps[index];
                        step.await_decision();
                        let call = step.tool_call(params).clarify();
                        NextStep::Clarify {
                            index,
                            step_id: step.id.clone(),
                            call,
                            snapshot: StepSnapshot::from(&*step),
                        }
                    }
                } else {
                    let params = self.resolver.resolve(&plan, index, &results);
                    let step = &mut plan.steps[index];
                    step.mark_running();
                    NextStep::Run {
                        index,
                        step_id: step.id.clone(),
                        critical: step.critical,
                        call: step.tool_call(params),
                        snapshot: StepSnapshot::from(&*step),
                    }
                }
            };

            match next {
                NextStep::Settled { index, snapshot } => {
                    steps_executed += 1;
                    self.report(
                        self.sink
                            .notify_step_updated(&owner_id, &workflow_id, index, &snapshot),
                    );
                }
                NextStep::Awaiting => {
                    let plan = entry.read().await;
                    debug!(workflow_id = %workflow_id, "Still awaiting a decision");
                    return Ok(ExecutionSummary::from_plan(&plan, steps_executed));
                }
                NextStep::Clarify {
                    index,
                    step_id,
                    call,
                    snapshot,
                } => {
                    self.report(
                        self.sink
                            .notify_step_updated(&owner_id, &workflow_id, index, &snapshot),
                    );
                    debug!(
                        workflow_id = %workflow_id,
                        step_id = %step_id,
                        tool = %call.tool_name,
                        "Requesting clarification"
                    );
                    let clarification = self.dispatch.invoke(call).await;

                    let mut plan = entry.write().await;
                    if plan.status == WorkflowStatus::Cancelled {
                        break Halt::Cancelled;
                    }
                    if !clarification.success {
                        warn!(
                            workflow_id = %workflow_id,
                            step_id = %step_id,
                            "Clarification failed: {}",
                            clarification.error_message()
                        );
                    }
                    plan.pending_decision =
                        Some(PendingDecision::from_clarification(&step_id, &clarification));
                    plan.touch();
                    info!(
                        workflow_id = %workflow_id,
                        step_id = %step_id,
                        "Workflow awaiting user input"
                    );
                    return Ok(ExecutionSummary::from_plan(&plan, steps_executed));
                }
                NextStep::Run {
                    index,
                    step_id,
                    critical,
                    call,
                    snapshot,
                } => {
                    self.report(
                        self.sink
                            .notify_step_updated(&owner_id, &workflow_id, index, &snapshot),
                    );
                    debug!(
                        workflow_id = %workflow_id,
                        step_id = %step_id,
                        tool = %call.tool_name,
                        action = %call.action_name,
                        "Executing step"
                    );
                    let result = self.dispatch.invoke(call).await;
                    let success = result.success;
                    let data = result.data.clone();
                    let message = result.error_message();

                    let snapshot = {
                        let mut plan = entry.write().await;
                        let step = &mut plan.steps[index];
                        step.record_result(result);
                        let snapshot = StepSnapshot::from(&*step);
                        plan.advance();
                        snapshot
                    };
                    steps_executed += 1;
                    self.report(
                        self.sink
                            .notify_step_updated(&owner_id, &workflow_id, index, &snapshot),
                    );

                    if success {
                        results.record(&step_id, data);
                        if let Verdict::Pause(reason) =
                            self.consult_oracle(entry, &workflow_id, index).await
                        {
                            let mut plan = entry.write().await;
                            if plan.status == WorkflowStatus::Cancelled {
                                break Halt::Cancelled;
                            }
                            plan.status = WorkflowStatus::Paused;
                            plan.touch();
                            info!(
                                workflow_id = %workflow_id,
                                step_id = %step_id,
                                "Workflow paused by oracle: {}",
                                reason.as_deref().unwrap_or("no reason given")
                            );
                            return Ok(ExecutionSummary::from_plan(&plan, steps_executed));
                        }
                    } else if critical {
                        warn!(
                            workflow_id = %workflow_id,
                            step_id = %step_id,
                            "Critical step failed: {}",
                            message
                        );
                        break Halt::CriticalFailure;
                    } else {
                        warn!(
                            workflow_id = %workflow_id,
                            step_id = %step_id,
                            "Step failed, continuing: {}",
                            message
                        );
                    }
                }
            }
        };

        let (summary, snapshot) = {
            let mut plan = entry.write().await;
            match halt {
                Halt::Cancelled => plan.skip_remaining(),
                Halt::CriticalFailure => {
                    if plan.status != WorkflowStatus::Cancelled {
                        plan.status = WorkflowStatus::Failed;
                    }
                    plan.skip_remaining();
                }
                Halt::Exhausted => {
                    if plan.status != WorkflowStatus::Cancelled {
                        plan.status = plan.settled_status();
                    }
                }
            }
            plan.pending_decision = None;
            plan.touch();
            (
                ExecutionSummary::from_plan(&plan, steps_executed),
                plan.snapshot(),
            )
        };

        info!(
            workflow_id = %workflow_id,
            status = %summary.status,
            steps_executed = summary.steps_executed,
            "Workflow execution finished"
        );
        self.report(self.sink.notify_workflow_completed(&owner_id, &snapshot));
        Ok(summary)
    }

    /// Ask the oracle about the step at `index`, apply any safe insertion
    /// and report whether to keep going. Oracle trouble means "continue".
    async fn consult_oracle(&self, entry: &WorkflowEntry, workflow_id: &str, index: usize) -> Verdict {
        let Some(oracle) = &self.oracle else {
            return Verdict::Continue;
        };

        let (step_summary, workflow_summary, lineage) = {
            let plan = entry.read().await;
            if plan.status == WorkflowStatus::Cancelled {
                return Verdict::Continue;
            }
            let Some(step) = plan.steps.get(index) else {
                return Verdict::Continue;
            };
            (
                StepSummary::from_step(step, index, self.config.elide_threshold),
                WorkflowSummary::from_plan(&plan),
                step.lineage.clone(),
            )
        };

        if self
            .throttle
            .check_and_record(workflow_id, &lineage)
            .await
            != ThrottleDecision::Allowed
        {
            return Verdict::Continue;
        }

        let judgment = match timeout(
            self.config.oracle_timeout,
            oracle.evaluate(&step_summary, &workflow_summary),
        )
        .await
        {
            Ok(Ok(judgment)) => judgment,
            Ok(Err(e)) => {
                warn!(
                    workflow_id = %workflow_id,
                    step_id = %step_summary.step_id,
                    error = %e,
                    "Oracle evaluation failed, continuing unchanged"
                );
                return Verdict::Continue;
            }
            Err(_) => {
                warn!(
                    workflow_id = %workflow_id,
                    step_id = %step_summary.step_id,
                    timeout_ms = self.config.oracle_timeout.as_millis() as u64,
                    "Oracle evaluation timed out, continuing unchanged"
                );
                return Verdict::Continue;
            }
        };

        debug!(
            workflow_id = %workflow_id,
            step_id = %step_summary.step_id,
            modify = judgment.modify,
            safe = judgment.safe_to_modify,
            "Oracle judgment: {}",
            judgment.reasoning.as_deref().unwrap_or("-")
        );

        if judgment.modify && !judgment.safe_to_modify {
            info!(
                workflow_id = %workflow_id,
                step_id = %step_summary.step_id,
                "Oracle modification not marked safe, ignoring"
            );
        }

        if !judgment.step_successful || judgment.wants_insertion() {
            let mut plan = entry.write().await;

            if !judgment.step_successful {
                warn!(
                    workflow_id = %workflow_id,
                    step_id = %step_summary.step_id,
                    "Oracle flagged step result as unsuccessful"
                );
                let flags = plan
                    .metadata
                    .entry("oracle_flags")
                    .or_insert_with(|| json!([]));
                if let Some(flags) = flags.as_array_mut() {
                    flags.push(json!({
                        "step_id": step_summary.step_id,
                        "reasoning": judgment.reasoning,
                    }));
                }
            }

            if judgment.wants_insertion() && plan.status != WorkflowStatus::Cancelled {
                let requested = judgment.inserted_steps.len();
                if plan.inserted_steps + requested > self.config.max_inserted_steps {
                    warn!(
                        workflow_id = %workflow_id,
                        step_id = %step_summary.step_id,
                        inserted = plan.inserted_steps,
                        requested,
                        max = self.config.max_inserted_steps,
                        "Insertion budget spent, discarding oracle insertion"
                    );
                } else {
                    match plan
                        .insert_at_cursor(judgment.inserted_steps.clone(), &step_summary.step_id)
                    {
                        Ok(ids) => info!(
                            workflow_id = %workflow_id,
                            after = %step_summary.step_id,
                            inserted = ?ids,
                            "Inserted steps at cursor"
                        ),
                        Err(e) => warn!(
                            workflow_id = %workflow_id,
                            step_id = %step_summary.step_id,
                            error = %e,
                            "Discarding invalid oracle insertion"
                        ),
                    }
                }
            }
        }

        if judgment.should_continue {
            Verdict::Continue
        } else {
            Verdict::Pause(judgment.reasoning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes params back; fails for tool "fail"
    struct EchoDispatch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolDispatch for EchoDispatch {
        async fn invoke(&self, call: ToolCall) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if call.tool_name == "fail" {
                ToolResult::error("tool failed")
            } else {
                ToolResult::success(Value::Object(call.params))
            }
        }
    }

    fn engine() -> (WorkflowEngine, Arc<EchoDispatch>) {
        let dispatch = Arc::new(EchoDispatch {
            calls: AtomicUsize::new(0),
        });
        (WorkflowEngine::new(dispatch.clone()), dispatch)
    }

    #[tokio::test]
    async fn test_runs_to_completion() {
        let (engine, dispatch) = engine();
        let id = engine
            .create_and_register(
                vec![
                    StepSpec::new("echo", "run")
                        .with_id("a")
                        .with_param("total", json!(42)),
                    StepSpec::new("echo", "run")
                        .with_id("b")
                        .with_param("value", json!("<ref a.total>")),
                ],
                "alice",
                "conv",
            )
            .await
            .unwrap();

        let summary = engine.execute(&id).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.steps_executed, 2);
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 2);

        let status = engine.get_status(&id).await.unwrap();
        assert_eq!(status.current_step_index, 2);
        let b = status.step("b").unwrap();
        assert_eq!(b.result.as_ref().unwrap().data["value"], json!(42));
    }

    #[tokio::test]
    async fn test_validation_and_not_found() {
        let (engine, _) = engine();
        let err = engine
            .create_and_register(vec![StepSpec::new("echo", "")], "alice", "conv")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        assert!(matches!(
            engine.execute("missing").await,
            Err(EngineError::NotFound(_))
        ));
        assert!(!engine.cancel("missing").await);
    }

    #[tokio::test]
    async fn test_non_critical_failure_fails_forward() {
        let (engine, _) = engine();
        let id = engine
            .create_and_register(
                vec![
                    StepSpec::new("fail", "run").with_id("a").non_critical(),
                    StepSpec::new("echo", "run").with_id("b"),
                ],
                "alice",
                "conv",
            )
            .await
            .unwrap();

        let summary = engine.execute(&id).await.unwrap();
        assert_eq!(summary.status, WorkflowStatus::Failed);
        assert_eq!(summary.failed_step_id.as_deref(), Some("a"));

        let status = engine.get_status(&id).await.unwrap();
        let b = status.step("b").unwrap();
        assert!(b.error.as_deref().unwrap().starts_with("dependencies not met"));
    }

    #[tokio::test]
    async fn test_cancel_idle_workflow_skips_steps() {
        let (engine, dispatch) = engine();
        let id = engine
            .create_and_register(vec![StepSpec::new("echo", "run")], "alice", "conv")
            .await
            .unwrap();

        assert!(engine.cancel(&id).await);
        assert!(!engine.cancel(&id).await);

        let summary = engine.execute(&id).await.unwrap();
        assert_eq!(summary.status, WorkflowStatus::Cancelled);
        assert!(summary.error.is_some());
        assert_eq!(dispatch.calls.load(Ordering::SeqCst), 0);

        let status = engine.get_status(&id).await.unwrap();
        assert_eq!(status.steps[0].status, crate::step::StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_evict_and_clear() {
        let (engine, _) = engine();
        let a = engine
            .create_and_register(vec![StepSpec::new("echo", "run")], "alice", "c")
            .await
            .unwrap();
        engine
            .create_and_register(vec![StepSpec::new("echo", "run")], "alice", "c")
            .await
            .unwrap();

        assert_eq!(engine.list_workflows("alice").await.len(), 2);
        assert_eq!(engine.evict(&a).await, Ok(true));
        assert_eq!(engine.list_workflows("alice").await.len(), 1);
        assert_eq!(engine.clear().await, 1);
        assert!(engine.list_workflows("alice").await.is_empty());
    }
}

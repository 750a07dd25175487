//! Shared fixtures: instrumented dispatcher, scripted oracle, recording sink

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use relay_core::{InvocationMode, ToolCall, ToolDispatch, ToolResult};
use relay_workflows::oracle::{Judgment, ReasoningOracle, StepSummary, WorkflowSummary};
use relay_workflows::progress::{ProgressEvent, ProgressSink};
use relay_workflows::step::StepSpec;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// One observed tool call
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub tool: String,
    pub action: String,
    pub params: Map<String, Value>,
    pub mode: InvocationMode,
    pub timeout_ms: Option<u64>,
    pub started: Instant,
    pub finished: Instant,
}

/// Dispatcher that records every call.
///
/// Execute mode echoes the params unless the tool has scripted data or is
/// marked failing. Clarify mode returns `{question, options}` from the
/// params. A gated tool announces itself on `entered` and then waits for
/// `release`.
#[derive(Default)]
pub struct RecordingDispatch {
    records: Mutex<Vec<CallRecord>>,
    scripted: HashMap<String, Value>,
    failing: HashSet<String>,
    gated: HashSet<String>,
    delay: Option<Duration>,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(mut self, tool: &str, data: Value) -> Self {
        self.scripted.insert(tool.to_string(), data);
        self
    }

    pub fn failing(mut self, tool: &str) -> Self {
        self.failing.insert(tool.to_string());
        self
    }

    pub fn gated(mut self, tool: &str) -> Self {
        self.gated.insert(tool.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn params_for(&self, tool: &str) -> Option<Map<String, Value>> {
        self.records()
            .into_iter()
            .rev()
            .find(|r| r.tool == tool && r.mode == InvocationMode::Execute)
            .map(|r| r.params)
    }
}

#[async_trait]
impl ToolDispatch for RecordingDispatch {
    async fn invoke(&self, call: ToolCall) -> ToolResult {
        let started = Instant::now();
        if self.gated.contains(&call.tool_name) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match call.mode {
            InvocationMode::Clarify => ToolResult::success(json!({
                "question": call.params.get("question").cloned().unwrap_or(Value::Null),
                "options": call.params.get("options").cloned().unwrap_or_else(|| json!([])),
            })),
            InvocationMode::Execute if self.failing.contains(&call.tool_name) => {
                ToolResult::error(format!("{} exploded", call.tool_name))
            }
            InvocationMode::Execute => match self.scripted.get(&call.tool_name) {
                Some(data) => ToolResult::success(data.clone()),
                None => ToolResult::success(Value::Object(call.params.clone())),
            },
        };

        self.records.lock().unwrap().push(CallRecord {
            tool: call.tool_name,
            action: call.action_name,
            params: call.params,
            mode: call.mode,
            timeout_ms: call.timeout_ms,
            started,
            finished: Instant::now(),
        });
        result
    }
}

/// Oracle answering per step id, `proceed` otherwise
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<HashMap<String, Judgment>>,
    seen: Mutex<Vec<StepSummary>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_step(self, step_id: &str, judgment: Judgment) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert(step_id.to_string(), judgment);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<StepSummary> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn evaluate(&self, step: &StepSummary, _workflow: &WorkflowSummary) -> Result<Judgment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(step.clone());
        let answer = self.answers.lock().unwrap().remove(&step.step_id);
        Ok(answer.unwrap_or_else(Judgment::proceed))
    }
}

/// Oracle that asks for one more step after every step it sees
#[derive(Default)]
pub struct InsertingOracle {
    calls: AtomicUsize,
}

impl InsertingOracle {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningOracle for InsertingOracle {
    async fn evaluate(&self, _step: &StepSummary, _workflow: &WorkflowSummary) -> Result<Judgment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Judgment::insert(vec![
            StepSpec::new("echo", "run").with_id("again"),
        ]))
    }
}

/// Oracle that always errors
pub struct BrokenOracle;

#[async_trait]
impl ReasoningOracle for BrokenOracle {
    async fn evaluate(&self, _step: &StepSummary, _workflow: &WorkflowSummary) -> Result<Judgment> {
        bail!("model unavailable")
    }
}

/// Oracle that never answers in time
pub struct StalledOracle;

#[async_trait]
impl ReasoningOracle for StalledOracle {
    async fn evaluate(&self, _step: &StepSummary, _workflow: &WorkflowSummary) -> Result<Judgment> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Judgment::pause("too late"))
    }
}

/// Sink keeping every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind()).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, event: ProgressEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Sink that rejects everything
pub struct FailingSink;

impl ProgressSink for FailingSink {
    fn publish(&self, _event: ProgressEvent) -> Result<()> {
        bail!("subscriber gone")
    }
}

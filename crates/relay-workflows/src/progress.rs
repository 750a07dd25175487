//! Progress notifications
//!
//! The engine reports workflow start, every step transition and workflow
//! completion to a sink, addressed by owner. Sinks must not block; the
//! engine logs and ignores any error they return.

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::payload::{contains_large_payload, elide_payloads};
use crate::plan::{StepSnapshot, WorkflowSnapshot};

/// One progress notification
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    WorkflowStarted {
        owner_id: String,
        workflow: WorkflowSnapshot,
    },
    StepUpdated {
        owner_id: String,
        workflow_id: String,
        step_index: usize,
        step: StepSnapshot,
    },
    WorkflowCompleted {
        owner_id: String,
        workflow: WorkflowSnapshot,
    },
}

impl ProgressEvent {
    pub fn owner_id(&self) -> &str {
        match self {
            ProgressEvent::WorkflowStarted { owner_id, .. }
            | ProgressEvent::StepUpdated { owner_id, .. }
            | ProgressEvent::WorkflowCompleted { owner_id, .. } => owner_id,
        }
    }

    pub fn workflow_id(&self) -> &str {
        match self {
            ProgressEvent::WorkflowStarted { workflow, .. }
            | ProgressEvent::WorkflowCompleted { workflow, .. } => &workflow.id,
            ProgressEvent::StepUpdated { workflow_id, .. } => workflow_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::WorkflowStarted { .. } => "workflow_started",
            ProgressEvent::StepUpdated { .. } => "step_updated",
            ProgressEvent::WorkflowCompleted { .. } => "workflow_completed",
        }
    }
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: ProgressEvent) -> Result<()>;

    fn notify_workflow_started(&self, owner_id: &str, workflow: &WorkflowSnapshot) -> Result<()> {
        self.publish(ProgressEvent::WorkflowStarted {
            owner_id: owner_id.to_string(),
            workflow: workflow.clone(),
        })
    }

    fn notify_step_updated(
        &self,
        owner_id: &str,
        workflow_id: &str,
        step_index: usize,
        step: &StepSnapshot,
    ) -> Result<()> {
        self.publish(ProgressEvent::StepUpdated {
            owner_id: owner_id.to_string(),
            workflow_id: workflow_id.to_string(),
            step_index,
            step: step.clone(),
        })
    }

    fn notify_workflow_completed(&self, owner_id: &str, workflow: &WorkflowSnapshot) -> Result<()> {
        self.publish(ProgressEvent::WorkflowCompleted {
            owner_id: owner_id.to_string(),
            workflow: workflow.clone(),
        })
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn publish(&self, _event: ProgressEvent) -> Result<()> {
        Ok(())
    }
}

/// Fans events out to any number of subscribers over a broadcast channel.
///
/// Subscribers filter by owner themselves. Having no subscriber is not an
/// error; slow subscribers lose the oldest events.
pub struct BroadcastProgressSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastProgressSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for BroadcastProgressSink {
    fn publish(&self, event: ProgressEvent) -> Result<()> {
        // send only fails when nobody is listening
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Writes one log line per event, payloads elided
pub struct TracingProgressSink {
    elide_threshold: usize,
}

impl TracingProgressSink {
    pub fn new(elide_threshold: usize) -> Self {
        Self { elide_threshold }
    }

    /// Log form of step data; only copied when something needs eliding
    fn render(&self, data: &Value) -> String {
        if contains_large_payload(data, self.elide_threshold) {
            elide_payloads(data, self.elide_threshold).to_string()
        } else {
            data.to_string()
        }
    }
}

impl Default for TracingProgressSink {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl ProgressSink for TracingProgressSink {
    fn publish(&self, event: ProgressEvent) -> Result<()> {
        match &event {
            ProgressEvent::WorkflowStarted { owner_id, workflow } => info!(
                owner = %owner_id,
                workflow = %workflow.id,
                steps = workflow.total_steps,
                "Workflow started: {}",
                workflow.title
            ),
            ProgressEvent::StepUpdated {
                owner_id,
                workflow_id,
                step_index,
                step,
            } => {
                let data = step
                    .result
                    .as_ref()
                    .map(|r| self.render(&r.data))
                    .unwrap_or_default();
                info!(
                    owner = %owner_id,
                    workflow = %workflow_id,
                    step = %step.id,
                    index = step_index,
                    status = step.status.as_str(),
                    "Step {}: {}",
                    step.status.as_str(),
                    data
                )
            }
            ProgressEvent::WorkflowCompleted { owner_id, workflow } => info!(
                owner = %owner_id,
                workflow = %workflow.id,
                status = workflow.status.as_str(),
                "Workflow finished: {}",
                workflow.status
            ),
        }
        Ok(())
    }
}

/// Forwards each event to every inner sink, even when one fails
#[derive(Default)]
pub struct FanoutProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ProgressSink for FanoutProgressSink {
    fn publish(&self, event: ProgressEvent) -> Result<()> {
        let failures: Vec<String> = self
            .sinks
            .iter()
            .filter_map(|sink| sink.publish(event.clone()).err())
            .map(|e| e.to_string())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} sink(s) failed: {}", failures.len(), failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::WorkflowPlan;
    use crate::step::StepSpec;
    use anyhow::bail;

    struct FailingSink;

    impl ProgressSink for FailingSink {
        fn publish(&self, _event: ProgressEvent) -> Result<()> {
            bail!("socket closed")
        }
    }

    fn snapshot() -> WorkflowSnapshot {
        WorkflowPlan::from_specs(vec![StepSpec::new("echo", "run")], "alice", "c")
            .unwrap()
            .snapshot()
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastProgressSink::new(8);
        assert!(sink.notify_workflow_started("alice", &snapshot()).is_ok());

        let mut rx = sink.subscribe();
        let snap = snapshot();
        sink.notify_step_updated("alice", &snap.id, 0, &snap.steps[0])
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "step_updated");
        assert_eq!(event.owner_id(), "alice");
        assert_eq!(event.workflow_id(), snap.id);
    }

    #[test]
    fn test_fanout_reaches_all_and_reports_failures() {
        let broadcast = Arc::new(BroadcastProgressSink::new(8));
        let mut rx = broadcast.subscribe();
        let fanout = FanoutProgressSink::new()
            .with_sink(Arc::new(FailingSink))
            .with_sink(broadcast.clone())
            .with_sink(Arc::new(TracingProgressSink::default()));
        assert_eq!(fanout.len(), 3);

        let err = fanout
            .notify_workflow_completed("alice", &snapshot())
            .unwrap_err();
        assert!(err.to_string().contains("socket closed"));
        assert_eq!(rx.try_recv().unwrap().kind(), "workflow_completed");
    }

    #[test]
    fn test_tracing_sink_elides_only_large_data() {
        let sink = TracingProgressSink::new(64);
        let small = serde_json::json!({"total": 42});
        assert_eq!(sink.render(&small), r#"{"total":42}"#);

        let large = serde_json::json!({"text": "x".repeat(200)});
        let rendered = sink.render(&large);
        assert!(rendered.contains("more bytes]"));
        assert!(rendered.len() < 200);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ProgressEvent::WorkflowStarted {
            owner_id: "alice".into(),
            workflow: snapshot(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "workflow_started");
        assert_eq!(value["owner_id"], "alice");
    }
}

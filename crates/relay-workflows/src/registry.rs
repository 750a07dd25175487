//! Workflow Registry - registered plans keyed by id
//!
//! Each entry pairs the plan with an execution lock. The plan lock is held
//! only for short bookkeeping sections, never across a tool call, so status
//! queries and cancellation stay responsive while a step runs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::plan::{WorkflowPlan, WorkflowSnapshot};

/// Proof that the holder is the only executor of a workflow
pub type ExecutionGuard = OwnedMutexGuard<()>;

pub struct WorkflowEntry {
    plan: RwLock<WorkflowPlan>,
    exec_lock: Arc<Mutex<()>>,
}

impl WorkflowEntry {
    fn new(plan: WorkflowPlan) -> Self {
        Self {
            plan: RwLock::new(plan),
            exec_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, WorkflowPlan> {
        self.plan.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, WorkflowPlan> {
        self.plan.write().await
    }

    /// Claim the execution lock without waiting
    pub fn try_begin_execution(&self) -> Option<ExecutionGuard> {
        self.exec_lock.clone().try_lock_owned().ok()
    }

    pub fn is_executing(&self) -> bool {
        self.exec_lock.try_lock().is_err()
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.plan.read().await.snapshot()
    }
}

/// In-memory store of every registered workflow
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<WorkflowEntry>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, plan: WorkflowPlan) -> String {
        let id = plan.id.clone();
        debug!("Registering workflow {} ({} steps)", id, plan.steps.len());
        let mut workflows = self.workflows.write().await;
        workflows.insert(id.clone(), Arc::new(WorkflowEntry::new(plan)));
        id
    }

    pub async fn get(&self, workflow_id: &str) -> Option<Arc<WorkflowEntry>> {
        self.workflows.read().await.get(workflow_id).cloned()
    }

    pub async fn contains(&self, workflow_id: &str) -> bool {
        self.workflows.read().await.contains_key(workflow_id)
    }

    /// Snapshots of every workflow owned by `owner_id`, oldest first
    pub async fn list_by_owner(&self, owner_id: &str) -> Vec<WorkflowSnapshot> {
        let entries: Vec<Arc<WorkflowEntry>> =
            self.workflows.read().await.values().cloned().collect();

        let mut snapshots = Vec::new();
        for entry in entries {
            let plan = entry.read().await;
            if plan.owner_id == owner_id {
                snapshots.push(plan.snapshot());
            }
        }
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshots
    }

    /// Remove a workflow unless it is executing
    pub async fn remove(&self, workflow_id: &str) -> EngineResult<bool> {
        let mut workflows = self.workflows.write().await;
        match workflows.get(workflow_id).map(|entry| entry.is_executing()) {
            None => Ok(false),
            Some(true) => Err(EngineError::InvalidState(format!(
                "workflow {} is executing",
                workflow_id
            ))),
            Some(false) => {
                workflows.remove(workflow_id);
                info!("Evicted workflow {}", workflow_id);
                Ok(true)
            }
        }
    }

    /// Drop every idle workflow; returns the ids removed
    pub async fn clear_idle(&self) -> Vec<String> {
        let mut workflows = self.workflows.write().await;
        let idle: Vec<String> = workflows
            .iter()
            .filter(|(_, entry)| !entry.is_executing())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            workflows.remove(id);
        }
        idle
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }
}

//! relay-workflows: Sequential tool-workflow engine
//!
//! Features:
//! - Linear plans executed one step at a time, one executor per workflow
//! - Inter-step parameter references and templates
//! - Oracle-driven re-planning, inserting only at the cursor
//! - Pausing for human decisions and resuming from them
//! - Progress events for live observers

pub mod adapters;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod payload;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod step;
pub mod throttle;

pub use config::EngineConfig;
pub use engine::{ExecutionSummary, PlanRequest, WorkflowEngine, WorkflowEngineBuilder};
pub use error::{EngineError, EngineResult};
pub use oracle::{AcceptAllOracle, Judgment, ReasoningOracle, StepSummary, WorkflowSummary};
pub use plan::{PendingDecision, StepSnapshot, WorkflowPlan, WorkflowSnapshot, WorkflowStatus};
pub use progress::{
    BroadcastProgressSink, FanoutProgressSink, NullProgressSink, ProgressEvent, ProgressSink,
    TracingProgressSink,
};
pub use step::{StepSpec, StepStatus, WorkflowStep};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::adapters::{AdapterRegistry, ParamAdapter};
    pub use super::engine::{ExecutionSummary, PlanRequest, WorkflowEngine};
    pub use super::error::{EngineError, EngineResult};
    pub use super::oracle::{Judgment, ReasoningOracle};
    pub use super::plan::{WorkflowSnapshot, WorkflowStatus};
    pub use super::progress::{ProgressEvent, ProgressSink};
    pub use super::step::{StepSpec, StepStatus};
    pub use super::throttle::{Clock, ManualClock, SystemClock};
}

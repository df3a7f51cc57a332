// Execution Engine Module
// Plan computation, node execution, events, and run orchestration

pub mod events;
pub mod executor;
pub mod plan;
pub mod report;

// Re-export key types
pub use events::{progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use executor::{EngineConfig, NodeExecutor, PipelineEngine};
pub use plan::ExecutionPlan;
pub use report::{
    ExecutionReport, NodeError, NodeErrorKind, NodeResult, NodeStatus, RunStatus, GRAPH_RESULT_ID,
};

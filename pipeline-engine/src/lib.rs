// Pipeline Engine Library
// Graph model, validation, planning, and execution for ML pipeline runs

pub mod execution;
pub mod graph;
pub mod work;

// Re-export commonly used types
pub use execution::{
    progress_channel, EngineConfig, EventSender, ExecutionEvent, ExecutionPlan, ExecutionReport,
    NodeError, NodeErrorKind, NodeExecutor, NodeResult, NodeStatus, PipelineEngine,
    ProgressReceiver, ProgressSender, RunStatus, GRAPH_RESULT_ID,
};
pub use graph::{Edge, GraphError, Node, NodeKind, PipelineGraph, Position};
pub use work::{
    DataLoaderUnit, EvaluationUnit, FnUnit, TransformUnit, WorkError, WorkInputs, WorkRegistry,
    WorkUnit,
};

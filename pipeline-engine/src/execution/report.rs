// Execution Report
// Per-node results and run-level status aggregation

use crate::graph::GraphError;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Synthetic result id used when a structural error prevents any node
/// from executing
pub const GRAPH_RESULT_ID: &str = "__graph__";

/// Terminal state of a single node within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
    Pending,
    Succeeded,
    Failed,
}

/// What went wrong for a node that did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeErrorKind {
    /// No work unit registered for the node's type
    UnknownNodeType,
    /// The work unit itself returned an error (or panicked)
    WorkUnitFailure,
    /// A direct or transitive predecessor failed; the unit never ran
    UpstreamFailure,
    /// The run deadline expired before the node finished (or started)
    Timeout,
    /// Structural problem with the graph; no node executed
    InvalidGraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    pub kind: NodeErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of one node execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: String,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
}

impl NodeResult {
    pub fn succeeded(node_id: impl Into<String>, output: Value) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Succeeded,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(
        node_id: impl Into<String>,
        kind: NodeErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Failed,
            output: None,
            error: Some(NodeError::new(kind, message)),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == NodeStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Failed
    }

    pub fn error_kind(&self) -> Option<NodeErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    PartialFailure,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::PartialFailure | RunStatus::Failed
        )
    }
}

/// The complete outcome of one engine invocation. Created fresh per
/// run and never persisted by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub pipeline_id: String,
    pub status: RunStatus,
    /// One result per node, in node insertion order
    pub node_results: Vec<NodeResult>,
    pub duration: Duration,
    pub started_at: SystemTime,
}

impl ExecutionReport {
    /// Aggregate per-node outcomes into the run status: succeeded only
    /// if every node succeeded, failed only if every node failed,
    /// partial otherwise. An empty run succeeds vacuously.
    pub fn aggregate(results: &[NodeResult]) -> RunStatus {
        if results.is_empty() {
            return RunStatus::Succeeded;
        }
        let failed = results.iter().filter(|r| r.is_failed()).count();
        if failed == 0 {
            RunStatus::Succeeded
        } else if failed == results.len() {
            RunStatus::Failed
        } else {
            RunStatus::PartialFailure
        }
    }

    /// Report for a graph rejected before any node executed: a single
    /// synthetic entry describing the structural problem.
    pub fn rejected(pipeline_id: impl Into<String>, err: &GraphError) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            status: RunStatus::Failed,
            node_results: vec![NodeResult::failed(
                GRAPH_RESULT_ID,
                NodeErrorKind::InvalidGraph,
                err.to_string(),
            )],
            duration: Duration::ZERO,
            started_at: SystemTime::now(),
        }
    }

    /// Look up the result for a node id
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.node_results.iter().find(|r| r.node_id == node_id)
    }

    pub fn succeeded_count(&self) -> usize {
        self.node_results.iter().filter(|r| r.is_succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.node_results.iter().filter(|r| r.is_failed()).count()
    }
}

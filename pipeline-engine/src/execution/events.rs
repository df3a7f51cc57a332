// Execution Events
// Progress reporting and event types for pipeline runs

use crate::execution::report::{NodeStatus, RunStatus};
use crate::graph::NodeKind;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Run started
    RunStarted {
        pipeline_id: String,
        total_nodes: usize,
        total_batches: usize,
    },

    /// Run reached a terminal status
    RunCompleted {
        pipeline_id: String,
        status: RunStatus,
        duration: Duration,
    },

    /// A node's work unit was invoked
    NodeStarted {
        node_id: String,
        kind: NodeKind,
        batch: usize,
    },

    /// A node reached a terminal status
    NodeCompleted {
        node_id: String,
        status: NodeStatus,
        duration: Duration,
    },

    /// A node was not executed (failed predecessor, expired deadline)
    NodeSkipped { node_id: String, reason: String },
}

impl ExecutionEvent {
    /// Create a run started event
    pub fn run_started(
        pipeline_id: impl Into<String>,
        total_nodes: usize,
        total_batches: usize,
    ) -> Self {
        Self::RunStarted {
            pipeline_id: pipeline_id.into(),
            total_nodes,
            total_batches,
        }
    }

    /// Create a run completed event
    pub fn run_completed(
        pipeline_id: impl Into<String>,
        status: RunStatus,
        duration: Duration,
    ) -> Self {
        Self::RunCompleted {
            pipeline_id: pipeline_id.into(),
            status,
            duration,
        }
    }

    /// Create a node started event
    pub fn node_started(node_id: impl Into<String>, kind: NodeKind, batch: usize) -> Self {
        Self::NodeStarted {
            node_id: node_id.into(),
            kind,
            batch,
        }
    }

    /// Create a node completed event
    pub fn node_completed(
        node_id: impl Into<String>,
        status: NodeStatus,
        duration: Duration,
    ) -> Self {
        Self::NodeCompleted {
            node_id: node_id.into(),
            status,
            duration,
        }
    }

    /// Create a node skipped event
    pub fn node_skipped(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NodeSkipped {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }
}

/// Fire-and-forget event sending; a dropped receiver never fails a run
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

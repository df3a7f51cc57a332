// Pipeline Execution Engine
// Orchestrates validation, planning, and batched node execution for one run

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::plan::ExecutionPlan;
use crate::execution::report::{ExecutionReport, NodeErrorKind, NodeResult, NodeStatus, RunStatus};
use crate::graph::{Node, PipelineGraph};
use crate::work::{WorkInputs, WorkRegistry};

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout_at;
use tracing::{debug, warn};

/// Configuration for pipeline runs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrently executing nodes within a batch (0 = unlimited)
    pub max_parallel_nodes: usize,
    /// Wall-clock budget for a whole run; expiry fails still-running
    /// and not-yet-run nodes with a timeout error
    pub run_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 0,
            run_timeout: None,
        }
    }
}

/// Executes a single node: looks up the work unit for its kind,
/// invokes it with the assembled inputs, and captures the outcome.
/// A failing or panicking unit never crashes the run.
pub struct NodeExecutor {
    registry: WorkRegistry,
}

impl NodeExecutor {
    pub fn new(registry: WorkRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &WorkRegistry {
        &self.registry
    }

    pub async fn execute(&self, node: &Node, inputs: WorkInputs) -> NodeResult {
        let unit = match self.registry.get(&node.kind) {
            Some(unit) => unit,
            None => {
                return NodeResult::failed(
                    &node.id,
                    NodeErrorKind::UnknownNodeType,
                    format!("no work unit registered for node type '{}'", node.kind),
                )
            }
        };

        match AssertUnwindSafe(unit.run(&node.data, &inputs))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => NodeResult::succeeded(&node.id, output),
            Ok(Err(err)) => {
                NodeResult::failed(&node.id, NodeErrorKind::WorkUnitFailure, err.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                NodeResult::failed(
                    &node.id,
                    NodeErrorKind::WorkUnitFailure,
                    format!("work unit panicked: {}", message),
                )
            }
        }
    }
}

/// Drives one run of a pipeline graph: validate, plan, then execute
/// batch by batch, propagating failures along edges. Holds no state
/// across runs; the graph is never mutated.
pub struct PipelineEngine {
    executor: Arc<NodeExecutor>,
    config: EngineConfig,
    event_tx: Option<ProgressSender>,
}

impl PipelineEngine {
    pub fn new(registry: WorkRegistry) -> Self {
        Self {
            executor: Arc::new(NodeExecutor::new(registry)),
            config: EngineConfig::default(),
            event_tx: None,
        }
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the work-unit registry, keeping configuration and any
    /// progress sender already applied
    pub fn with_registry(mut self, registry: WorkRegistry) -> Self {
        self.executor = Arc::new(NodeExecutor::new(registry));
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Run the graph to completion and return the report.
    ///
    /// Structural errors reject the run before any node executes.
    /// Per-node failures are recorded in that node's result and
    /// propagated to its successors as upstream failures; independent
    /// branches keep running.
    pub async fn run(
        &self,
        pipeline_id: &str,
        graph: &PipelineGraph,
        run_input: Option<Value>,
    ) -> ExecutionReport {
        let started_at = SystemTime::now();
        let start = Instant::now();

        if let Err(err) = graph.validate() {
            warn!(pipeline_id, error = %err, "rejecting run: invalid graph");
            self.event_tx.send_event(ExecutionEvent::run_completed(
                pipeline_id,
                RunStatus::Failed,
                start.elapsed(),
            ));
            return ExecutionReport::rejected(pipeline_id, &err);
        }

        let plan = match ExecutionPlan::build(graph) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(pipeline_id, error = %err, "rejecting run: planning failed");
                self.event_tx.send_event(ExecutionEvent::run_completed(
                    pipeline_id,
                    RunStatus::Failed,
                    start.elapsed(),
                ));
                return ExecutionReport::rejected(pipeline_id, &err);
            }
        };

        debug!(
            pipeline_id,
            nodes = graph.len(),
            batches = plan.len(),
            "starting pipeline run"
        );
        self.event_tx.send_event(ExecutionEvent::run_started(
            pipeline_id,
            graph.len(),
            plan.len(),
        ));

        let deadline = self
            .config
            .run_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let mut results: HashMap<String, NodeResult> = HashMap::with_capacity(graph.len());
        let mut expired = false;

        for (batch_idx, batch) in plan.batches().iter().enumerate() {
            if expired {
                // Deadline already hit: nothing further executes
                for node_id in batch {
                    let result = self.unreached(node_id, graph, &results);
                    self.event_tx
                        .send_event(ExecutionEvent::node_skipped(node_id, "run deadline expired"));
                    results.insert(node_id.clone(), result);
                }
                continue;
            }

            expired = self
                .run_batch(batch, batch_idx, graph, run_input.as_ref(), deadline, &mut results)
                .await;
        }

        let node_results: Vec<NodeResult> = graph
            .nodes()
            .iter()
            .filter_map(|n| results.remove(&n.id))
            .collect();
        let status = ExecutionReport::aggregate(&node_results);
        let duration = start.elapsed();

        debug!(pipeline_id, status = ?status, "pipeline run finished");
        self.event_tx.send_event(ExecutionEvent::run_completed(
            pipeline_id,
            status,
            duration,
        ));

        ExecutionReport {
            pipeline_id: pipeline_id.to_string(),
            status,
            node_results,
            duration,
            started_at,
        }
    }

    /// Execute one batch concurrently and block until every node in it
    /// is terminal. Returns true if the run deadline expired.
    async fn run_batch(
        &self,
        batch: &[String],
        batch_idx: usize,
        graph: &PipelineGraph,
        run_input: Option<&Value>,
        deadline: Option<tokio::time::Instant>,
        results: &mut HashMap<String, NodeResult>,
    ) -> bool {
        let mut join_set: JoinSet<(String, NodeResult, Duration)> = JoinSet::new();
        let limit = self.config.max_parallel_nodes;
        let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        let mut in_flight: Vec<String> = Vec::new();

        for node_id in batch {
            // A failed predecessor fails this node without invoking it
            let failed_pred = graph
                .predecessors(node_id)
                .into_iter()
                .find(|p| results.get(*p).map_or(false, |r| r.is_failed()));
            if let Some(pred) = failed_pred {
                let reason = format!("predecessor '{}' failed", pred);
                self.event_tx
                    .send_event(ExecutionEvent::node_skipped(node_id, reason.clone()));
                results.insert(
                    node_id.clone(),
                    NodeResult::failed(node_id, NodeErrorKind::UpstreamFailure, reason),
                );
                continue;
            }

            let Some(node) = graph.node(node_id) else {
                continue;
            };

            let mut inputs = WorkInputs::new();
            for pred in graph.predecessors(node_id) {
                if let Some(output) = results.get(pred).and_then(|r| r.output.clone()) {
                    inputs.upstream.insert(pred.to_string(), output);
                }
            }
            if graph.is_source(node_id) {
                inputs.run_input = run_input.cloned();
            }

            self.event_tx.send_event(ExecutionEvent::node_started(
                node_id,
                node.kind.clone(),
                batch_idx,
            ));
            in_flight.push(node_id.clone());

            let node = node.clone();
            let executor = Arc::clone(&self.executor);
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = match &semaphore {
                    Some(s) => s.acquire().await.ok(),
                    None => None,
                };
                let node_start = Instant::now();
                let result = executor.execute(&node, inputs).await;
                (node.id, result, node_start.elapsed())
            });
        }

        let mut expired = false;
        loop {
            let joined = match deadline {
                Some(d) if !expired => match timeout_at(d, join_set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        expired = true;
                        join_set.abort_all();
                        continue;
                    }
                },
                _ => join_set.join_next().await,
            };

            let Some(joined) = joined else { break };
            // Err here means the task was aborted at the deadline;
            // those nodes are settled from `in_flight` below
            if let Ok((node_id, result, elapsed)) = joined {
                self.event_tx.send_event(ExecutionEvent::node_completed(
                    &node_id,
                    result.status,
                    elapsed,
                ));
                in_flight.retain(|id| id != &node_id);
                results.insert(node_id, result);
            }
        }

        if expired {
            for node_id in in_flight {
                warn!(node_id = %node_id, "node cancelled by run timeout");
                self.event_tx.send_event(ExecutionEvent::node_completed(
                    &node_id,
                    NodeStatus::Failed,
                    Duration::ZERO,
                ));
                results.insert(
                    node_id.clone(),
                    NodeResult::failed(
                        &node_id,
                        NodeErrorKind::Timeout,
                        "run deadline expired while node was executing",
                    ),
                );
            }
        }

        expired
    }

    /// Settle a node the run never reached because the deadline expired
    fn unreached(
        &self,
        node_id: &str,
        graph: &PipelineGraph,
        results: &HashMap<String, NodeResult>,
    ) -> NodeResult {
        let failed_pred = graph
            .predecessors(node_id)
            .into_iter()
            .find(|p| results.get(*p).map_or(false, |r| r.is_failed()));
        match failed_pred {
            Some(pred) => NodeResult::failed(
                node_id,
                NodeErrorKind::UpstreamFailure,
                format!("predecessor '{}' failed", pred),
            ),
            None => NodeResult::failed(
                node_id,
                NodeErrorKind::Timeout,
                "run deadline expired before node executed",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;
    use crate::graph::{Edge, Node, NodeKind};
    use crate::work::{FnUnit, WorkError, WorkUnit};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn graph(nodes: &[(&str, NodeKind)], edges: &[(&str, &str)]) -> PipelineGraph {
        let nodes = nodes
            .iter()
            .map(|(id, kind)| Node::new(*id, kind.clone()))
            .collect();
        let edges = edges
            .iter()
            .enumerate()
            .map(|(i, (s, t))| Edge::new(format!("e{}", i), *s, *t))
            .collect();
        PipelineGraph::new(nodes, edges).unwrap()
    }

    /// Registry whose transform unit counts invocations and fails any
    /// node whose data carries a truthy `fail` flag
    fn counting_registry(counter: Arc<AtomicUsize>) -> WorkRegistry {
        WorkRegistry::new().with_unit(
            NodeKind::Transform,
            Arc::new(FnUnit::new(move |config: &Map<String, Value>, _: &WorkInputs| {
                counter.fetch_add(1, Ordering::SeqCst);
                if config.get("fail").map_or(false, |v| v == &json!(true)) {
                    Err(WorkError::failed("configured to fail"))
                } else {
                    Ok(json!({"ok": true}))
                }
            })),
        )
    }

    fn failing_node(id: &str) -> Node {
        let mut data = Map::new();
        data.insert("fail".to_string(), json!(true));
        Node::new(id, NodeKind::Transform).with_data(data)
    }

    struct SleepUnit(Duration);

    #[async_trait]
    impl WorkUnit for SleepUnit {
        async fn run(&self, _: &Map<String, Value>, _: &WorkInputs) -> Result<Value, WorkError> {
            tokio::time::sleep(self.0).await;
            Ok(json!({"slept": true}))
        }
    }

    #[tokio::test]
    async fn test_single_data_loader_node() {
        let registry = WorkRegistry::new().with_unit(
            NodeKind::DataLoader,
            Arc::new(FnUnit::new(|_: &Map<String, Value>, _: &WorkInputs| Ok(json!({"rows": 10})))),
        );
        let engine = PipelineEngine::new(registry);
        let g = graph(&[("loader", NodeKind::DataLoader)], &[]);

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.node_results.len(), 1);
        let result = report.result("loader").unwrap();
        assert!(result.is_succeeded());
        assert_eq!(result.output, Some(json!({"rows": 10})));
    }

    #[tokio::test]
    async fn test_partial_failure_propagates_downstream_only() {
        // a -> b -> c, a -> d; b fails
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(Arc::clone(&counter)));

        let nodes = vec![
            Node::new("a", NodeKind::Transform),
            failing_node("b"),
            Node::new("c", NodeKind::Transform),
            Node::new("d", NodeKind::Transform),
        ];
        let edges = vec![
            Edge::new("e0", "a", "b"),
            Edge::new("e1", "b", "c"),
            Edge::new("e2", "a", "d"),
        ];
        let g = PipelineGraph::new(nodes, edges).unwrap();

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert!(report.result("a").unwrap().is_succeeded());
        assert_eq!(
            report.result("b").unwrap().error_kind(),
            Some(NodeErrorKind::WorkUnitFailure)
        );
        assert_eq!(
            report.result("c").unwrap().error_kind(),
            Some(NodeErrorKind::UpstreamFailure)
        );
        assert!(report.result("d").unwrap().is_succeeded());
        // c's work unit was never invoked
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cyclic_graph_runs_nothing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(Arc::clone(&counter)));
        let g = graph(
            &[("a", NodeKind::Transform), ("b", NodeKind::Transform)],
            &[("a", "b"), ("b", "a")],
        );

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.node_results.len(), 1);
        assert_eq!(
            report.node_results[0].error_kind(),
            Some(NodeErrorKind::InvalidGraph)
        );
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_node_type_fails_that_node_only() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(Arc::clone(&counter)));
        let g = graph(
            &[
                ("weird", NodeKind::Other("quantumSolver".to_string())),
                ("plain", NodeKind::Transform),
            ],
            &[],
        );

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert_eq!(
            report.result("weird").unwrap().error_kind(),
            Some(NodeErrorKind::UnknownNodeType)
        );
        assert!(report.result("plain").unwrap().is_succeeded());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_nodes_failing_folds_to_failed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(counter));

        let g = PipelineGraph::new(
            vec![failing_node("a"), failing_node("b")],
            vec![Edge::new("e0", "a", "b")],
        )
        .unwrap();

        let report = engine.run("p1", &g, None).await;
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(
            report.result("b").unwrap().error_kind(),
            Some(NodeErrorKind::UpstreamFailure)
        );
    }

    #[tokio::test]
    async fn test_inputs_keyed_by_predecessor_id_and_run_input_for_sources() {
        let registry = WorkRegistry::new().with_unit(
            NodeKind::Transform,
            Arc::new(FnUnit::new(|_: &Map<String, Value>, inputs: &WorkInputs| {
                Ok(json!({
                    "upstream_keys": inputs.upstream.keys().cloned().collect::<Vec<_>>(),
                    "run_input": inputs.run_input.clone().unwrap_or(Value::Null),
                }))
            })),
        );
        let engine = PipelineEngine::new(registry);
        let g = graph(
            &[
                ("left", NodeKind::Transform),
                ("right", NodeKind::Transform),
                ("sink", NodeKind::Transform),
            ],
            &[("left", "sink"), ("right", "sink")],
        );

        let report = engine
            .run("p1", &g, Some(json!({"dataset": "iris"})))
            .await;

        assert_eq!(report.status, RunStatus::Succeeded);
        // Sources see the run input, the sink does not
        let left = report.result("left").unwrap().output.as_ref().unwrap();
        assert_eq!(left["run_input"], json!({"dataset": "iris"}));
        let sink = report.result("sink").unwrap().output.as_ref().unwrap();
        assert_eq!(sink["run_input"], Value::Null);
        assert_eq!(sink["upstream_keys"], json!(["left", "right"]));
    }

    #[tokio::test]
    async fn test_repeat_runs_are_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(counter));

        let g = PipelineGraph::new(
            vec![
                Node::new("a", NodeKind::Transform),
                failing_node("b"),
                Node::new("c", NodeKind::Transform),
            ],
            vec![Edge::new("e0", "a", "b"), Edge::new("e1", "a", "c")],
        )
        .unwrap();

        let first = engine.run("p1", &g, Some(json!({"seed": 7}))).await;
        let second = engine.run("p1", &g, Some(json!({"seed": 7}))).await;

        assert_eq!(first.status, second.status);
        for (lhs, rhs) in first.node_results.iter().zip(&second.node_results) {
            assert_eq!(lhs.node_id, rhs.node_id);
            assert_eq!(lhs.status, rhs.status);
            assert_eq!(lhs.output, rhs.output);
            assert_eq!(lhs.error_kind(), rhs.error_kind());
        }
    }

    #[tokio::test]
    async fn test_panicking_unit_is_captured() {
        let registry = WorkRegistry::new().with_unit(
            NodeKind::Transform,
            Arc::new(FnUnit::new(|_: &Map<String, Value>, _: &WorkInputs| -> Result<Value, WorkError> {
                panic!("mock unit blew up")
            })),
        );
        let engine = PipelineEngine::new(registry);
        let g = graph(&[("a", NodeKind::Transform)], &[]);

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::Failed);
        let err = report.result("a").unwrap().error.as_ref().unwrap();
        assert_eq!(err.kind, NodeErrorKind::WorkUnitFailure);
        assert!(err.message.contains("mock unit blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_marks_nodes_timed_out() {
        let registry = WorkRegistry::new()
            .with_unit(
                NodeKind::Transform,
                Arc::new(SleepUnit(Duration::from_secs(60))),
            )
            .with_unit(
                NodeKind::Evaluation,
                Arc::new(FnUnit::new(|_: &Map<String, Value>, _: &WorkInputs| Ok(json!({"fast": true})))),
            );
        let engine = PipelineEngine::new(registry).with_config(EngineConfig {
            max_parallel_nodes: 0,
            run_timeout: Some(Duration::from_millis(100)),
        });

        // slow -> after and fast -> unreached; the second batch is
        // never executed
        let g = graph(
            &[
                ("slow", NodeKind::Transform),
                ("fast", NodeKind::Evaluation),
                ("after", NodeKind::Evaluation),
                ("unreached", NodeKind::Evaluation),
            ],
            &[("slow", "after"), ("fast", "unreached")],
        );

        let report = engine.run("p1", &g, None).await;

        assert_eq!(report.status, RunStatus::PartialFailure);
        assert!(report.result("fast").unwrap().is_succeeded());
        assert_eq!(
            report.result("unreached").unwrap().error_kind(),
            Some(NodeErrorKind::Timeout)
        );
        assert_eq!(
            report.result("slow").unwrap().error_kind(),
            Some(NodeErrorKind::Timeout)
        );
        // The unreached node blames its failed predecessor, not the clock
        assert_eq!(
            report.result("after").unwrap().error_kind(),
            Some(NodeErrorKind::UpstreamFailure)
        );
    }

    #[tokio::test]
    async fn test_max_parallel_nodes_still_completes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let engine = PipelineEngine::new(counting_registry(Arc::clone(&counter)))
            .with_config(EngineConfig {
                max_parallel_nodes: 1,
                run_timeout: None,
            });

        let g = graph(
            &[
                ("a", NodeKind::Transform),
                ("b", NodeKind::Transform),
                ("c", NodeKind::Transform),
            ],
            &[],
        );

        let report = engine.run("p1", &g, None).await;
        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_graph_succeeds() {
        let engine = PipelineEngine::new(WorkRegistry::builtin());
        let g = PipelineGraph::new(vec![], vec![]).unwrap();

        let report = engine.run("p1", &g, None).await;
        assert_eq!(report.status, RunStatus::Succeeded);
        assert!(report.node_results.is_empty());
    }

    #[tokio::test]
    async fn test_events_cover_the_run() {
        let (tx, mut rx) = progress_channel();
        let counter = Arc::new(AtomicUsize::new(0));
        let engine =
            PipelineEngine::new(counting_registry(counter)).with_progress(tx);

        let g = PipelineGraph::new(
            vec![failing_node("a"), Node::new("b", NodeKind::Transform)],
            vec![Edge::new("e0", "a", "b")],
        )
        .unwrap();

        let report = engine.run("p1", &g, None).await;
        assert_eq!(report.status, RunStatus::Failed);

        let mut started = 0;
        let mut completed = 0;
        let mut skipped = 0;
        let mut run_events = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::NodeStarted { .. } => started += 1,
                ExecutionEvent::NodeCompleted { .. } => completed += 1,
                ExecutionEvent::NodeSkipped { .. } => skipped += 1,
                ExecutionEvent::RunStarted { .. } | ExecutionEvent::RunCompleted { .. } => {
                    run_events += 1
                }
            }
        }

        assert_eq!(started, 1); // only "a" was invoked
        assert_eq!(completed, 1);
        assert_eq!(skipped, 1); // "b" skipped on upstream failure
        assert_eq!(run_events, 2);
    }

    #[tokio::test]
    async fn test_node_executor_unknown_kind() {
        let executor = NodeExecutor::new(WorkRegistry::new());
        let node = Node::new("x", NodeKind::Other("mystery".to_string()));

        let result = executor.execute(&node, WorkInputs::new()).await;
        assert_eq!(result.error_kind(), Some(NodeErrorKind::UnknownNodeType));
        assert!(result
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("mystery"));
    }
}

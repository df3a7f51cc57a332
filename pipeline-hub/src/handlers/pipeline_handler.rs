// Pipeline Handler
// CRUD over pipeline records plus the run operation that hands the
// stored graph to the execution engine

use crate::error::{HubError, HubResult};
use crate::records::{CreatePipeline, PipelineRecord, PipelineUpdate};
use crate::store::HubStore;
use crate::work::ModelUnit;

use pipeline_engine::{
    EngineConfig, ExecutionReport, NodeKind, PipelineEngine, ProgressSender, WorkRegistry,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub struct PipelineHandler {
    store: HubStore,
    engine: PipelineEngine,
}

impl PipelineHandler {
    /// Build a handler whose engine runs the built-in units plus the
    /// store-backed model unit
    pub fn new(store: HubStore) -> Self {
        let registry = WorkRegistry::builtin()
            .with_unit(NodeKind::Model, Arc::new(ModelUnit::new(store.clone())));
        Self {
            store,
            engine: PipelineEngine::new(registry),
        }
    }

    /// Replace the engine's work-unit registry, keeping any engine
    /// configuration or progress sender already applied
    pub fn with_registry(mut self, registry: WorkRegistry) -> Self {
        self.engine = self.engine.with_registry(registry);
        self
    }

    /// Set engine configuration (parallelism cap, run timeout)
    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine = self.engine.with_config(config);
        self
    }

    /// Set progress event sender for runs
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.engine = self.engine.with_progress(tx);
        self
    }

    pub async fn create(&self, request: CreatePipeline) -> HubResult<PipelineRecord> {
        if request.name.trim().is_empty() {
            return Err(HubError::invalid_input("pipeline name is required"));
        }

        let record = PipelineRecord::new(request.name, request.description)
            .with_graph(request.nodes, request.edges);
        info!(pipeline_id = %record.id, name = %record.name, "created pipeline");
        self.store.insert_pipeline(record.clone()).await;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> HubResult<PipelineRecord> {
        self.store
            .pipeline(id)
            .await
            .ok_or_else(|| HubError::not_found(format!("pipeline '{}'", id)))
    }

    pub async fn list(&self) -> Vec<PipelineRecord> {
        self.store.pipelines().await
    }

    pub async fn update(&self, id: &str, update: PipelineUpdate) -> HubResult<PipelineRecord> {
        self.store
            .update_pipeline(id, |record| {
                if let Some(name) = update.name {
                    record.name = name;
                }
                if let Some(description) = update.description {
                    record.description = description;
                }
                if let Some(nodes) = update.nodes {
                    record.nodes = nodes;
                }
                if let Some(edges) = update.edges {
                    record.edges = edges;
                }
            })
            .await
            .ok_or_else(|| HubError::not_found(format!("pipeline '{}'", id)))
    }

    pub async fn delete(&self, id: &str) -> HubResult<()> {
        self.store
            .remove_pipeline(id)
            .await
            .map(|_| ())
            .ok_or_else(|| HubError::not_found(format!("pipeline '{}'", id)))
    }

    /// Run a stored pipeline. A record whose nodes/edges do not form a
    /// well-formed graph yields a failed report with a synthetic
    /// entry, the same contract the engine applies to cyclic graphs.
    pub async fn run(&self, id: &str, run_input: Option<Value>) -> HubResult<ExecutionReport> {
        let record = self.get(id).await?;
        info!(pipeline_id = %record.id, name = %record.name, "running pipeline");

        let graph = match record.graph() {
            Ok(graph) => graph,
            Err(err) => return Ok(ExecutionReport::rejected(&record.id, &err)),
        };

        Ok(self.engine.run(&record.id, &graph, run_input).await)
    }
}

// Pipeline and Model Records
// The persisted shapes owned by the collaborator layer. The engine
// consumes only a pipeline's nodes and edges.

use chrono::{DateTime, Utc};
use pipeline_engine::{Edge, GraphError, Node, PipelineGraph};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A stored pipeline: metadata plus the authored node/edge graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_graph(mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        self.nodes = nodes;
        self.edges = edges;
        self
    }

    /// Build the executable graph from the stored nodes and edges
    pub fn graph(&self) -> Result<PipelineGraph, GraphError> {
        PipelineGraph::new(self.nodes.clone(), self.edges.clone())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields accepted when creating a pipeline
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Partial update for a pipeline; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub nodes: Option<Vec<Node>>,
    pub edges: Option<Vec<Edge>>,
}

/// A registered trained model and its artifact reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_type: String,
    pub version: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelRecord {
    pub fn new(
        name: impl Into<String>,
        model_type: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            model_type: model_type.into(),
            version: version.into(),
            file_path: None,
            parameters: Map::new(),
            metrics: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields accepted when registering a model
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateModel {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model_type: String,
    pub version: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub metrics: Map<String, Value>,
}

/// Partial update for a model; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model_type: Option<String>,
    pub version: Option<String>,
    pub file_path: Option<String>,
    pub parameters: Option<Map<String, Value>>,
    pub metrics: Option<Map<String, Value>>,
}

// Pipeline Graph
// Typed node/edge model with pre-built adjacency indexes and DAG validation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors for graph construction and validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// The kind of processing a node performs.
///
/// Unrecognized tags are preserved as `Other` so a run can fail that
/// single node with an unknown-type error instead of rejecting the
/// whole graph at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    DataLoader,
    Transform,
    Model,
    Evaluation,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::DataLoader => "dataLoader",
            NodeKind::Transform => "transform",
            NodeKind::Model => "model",
            NodeKind::Evaluation => "evaluation",
            NodeKind::Other(tag) => tag,
        }
    }

    /// Whether this is one of the known, registrable kinds
    pub fn is_known(&self) -> bool {
        !matches!(self, NodeKind::Other(_))
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "dataLoader" => NodeKind::DataLoader,
            "transform" => NodeKind::Transform,
            "model" => NodeKind::Model,
            "evaluation" => NodeKind::Evaluation,
            _ => NodeKind::Other(tag),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas position of a node. Display-only, opaque to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single processing node in a pipeline graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    /// Type-specific configuration, passed verbatim to the work unit
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            data: Map::new(),
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }
}

/// A directed edge routing the output of `source` into `target`'s inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A pipeline's node/edge graph with adjacency indexed once at
/// construction. Node and edge insertion order is preserved and used
/// as the tie-breaker everywhere ordering matters.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_indices: HashMap<String, usize>,
    /// Edge endpoints resolved to node indices, aligned with `edges`
    resolved: Vec<(usize, usize)>,
    /// Outgoing edge indices per node, in edge insertion order
    outgoing: Vec<Vec<usize>>,
    /// Incoming edge indices per node, in edge insertion order
    incoming: Vec<Vec<usize>>,
}

impl PipelineGraph {
    /// Build a graph, rejecting duplicate node ids and edges that
    /// reference nodes not present in the node list.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut node_indices = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node_indices.insert(node.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        let mut resolved = Vec::with_capacity(edges.len());
        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];

        for (i, edge) in edges.iter().enumerate() {
            let source = *node_indices.get(&edge.source).ok_or_else(|| {
                GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.clone(),
                }
            })?;
            let target = *node_indices.get(&edge.target).ok_or_else(|| {
                GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.clone(),
                }
            })?;

            resolved.push((source, target));
            outgoing[source].push(i);
            incoming[target].push(i);
        }

        Ok(Self {
            nodes,
            edges,
            node_indices,
            resolved,
            outgoing,
            incoming,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_indices.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Edges leaving the given node, in edge insertion order
    pub fn edges_from(&self, id: &str) -> Vec<&Edge> {
        match self.node_indices.get(id) {
            Some(&i) => self.outgoing[i].iter().map(|&e| &self.edges[e]).collect(),
            None => Vec::new(),
        }
    }

    /// Edges entering the given node, in edge insertion order
    pub fn edges_to(&self, id: &str) -> Vec<&Edge> {
        match self.node_indices.get(id) {
            Some(&i) => self.incoming[i].iter().map(|&e| &self.edges[e]).collect(),
            None => Vec::new(),
        }
    }

    /// Ids of direct predecessors, in edge insertion order
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.edges_to(id).iter().map(|e| e.source.as_str()).collect()
    }

    /// Ids of direct successors, in edge insertion order
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges_from(id)
            .iter()
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Whether the node has no incoming edges (a graph source)
    pub fn is_source(&self, id: &str) -> bool {
        match self.node_indices.get(id) {
            Some(&i) => self.incoming[i].is_empty(),
            None => false,
        }
    }

    pub(crate) fn incoming_count(&self, idx: usize) -> usize {
        self.incoming[idx].len()
    }

    pub(crate) fn successor_indices(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.outgoing[idx].iter().map(move |&e| self.resolved[e].1)
    }

    /// Confirm the graph is acyclic.
    ///
    /// Depth-first traversal with three-state marks; hitting an
    /// in-progress node closes a cycle, reported as the path from the
    /// re-encountered node around to itself. Roots are visited in node
    /// insertion order and neighbors in edge insertion order, so the
    /// same graph always reports the same cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut path = Vec::new();

        for idx in 0..self.nodes.len() {
            if marks[idx] == Mark::Unvisited {
                self.dfs_cycle(idx, &mut marks, &mut path)?;
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        idx: usize,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        marks[idx] = Mark::InProgress;
        path.push(idx);

        for next in self.successor_indices(idx) {
            match marks[next] {
                Mark::Unvisited => self.dfs_cycle(next, marks, path)?,
                Mark::InProgress => {
                    let start = path.iter().position(|&i| i == next).unwrap_or(0);
                    let mut cycle: Vec<String> = path[start..]
                        .iter()
                        .map(|&i| self.nodes[i].id.clone())
                        .collect();
                    cycle.push(self.nodes[next].id.clone());
                    return Err(GraphError::Cycle(cycle));
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks[idx] = Mark::Done;
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

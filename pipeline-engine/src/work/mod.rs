// Work Units
// Pluggable, node-type-specific computations invoked by the executor

use crate::graph::NodeKind;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod builtin;

pub use builtin::{DataLoaderUnit, EvaluationUnit, TransformUnit};

/// Errors a work unit can raise. Captured into the node's result by
/// the executor; never propagated past the engine boundary.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),

    #[error("missing required config '{0}'")]
    MissingConfig(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl WorkError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Inputs assembled for one node execution.
///
/// `upstream` maps each direct predecessor's node id to its output.
/// The external run input travels in its own field so it can never
/// collide with a predecessor id; it is populated only for source
/// nodes (nodes with no incoming edges).
#[derive(Debug, Clone, Default)]
pub struct WorkInputs {
    pub upstream: BTreeMap<String, Value>,
    pub run_input: Option<Value>,
}

impl WorkInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_upstream(upstream: BTreeMap<String, Value>) -> Self {
        Self {
            upstream,
            run_input: None,
        }
    }

    pub fn with_run_input(mut self, input: Value) -> Self {
        self.run_input = Some(input);
        self
    }

    /// The sole upstream output, for single-input node types
    pub fn sole_upstream(&self) -> Option<&Value> {
        if self.upstream.len() == 1 {
            self.upstream.values().next()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upstream.is_empty() && self.run_input.is_none()
    }
}

/// A node-type-specific computation. Opaque to the engine: the engine
/// only assembles inputs, invokes the unit, and records its outcome.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    async fn run(&self, config: &Map<String, Value>, inputs: &WorkInputs)
        -> Result<Value, WorkError>;
}

/// Adapter turning a plain function into a work unit
pub struct FnUnit<F>(F);

impl<F> FnUnit<F>
where
    F: Fn(&Map<String, Value>, &WorkInputs) -> Result<Value, WorkError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> WorkUnit for FnUnit<F>
where
    F: Fn(&Map<String, Value>, &WorkInputs) -> Result<Value, WorkError> + Send + Sync,
{
    async fn run(
        &self,
        config: &Map<String, Value>,
        inputs: &WorkInputs,
    ) -> Result<Value, WorkError> {
        (self.0)(config, inputs)
    }
}

/// Registered work units, keyed by node kind. A kind with no
/// registered unit fails that node with an unknown-type error at run
/// time.
#[derive(Clone, Default)]
pub struct WorkRegistry {
    units: std::collections::HashMap<NodeKind, Arc<dyn WorkUnit>>,
}

impl WorkRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry wired with the built-in units (dataLoader,
    /// transform, evaluation). Model nodes need a collaborator-backed
    /// unit and are registered by the caller.
    pub fn builtin() -> Self {
        Self::new()
            .with_unit(NodeKind::DataLoader, Arc::new(DataLoaderUnit))
            .with_unit(NodeKind::Transform, Arc::new(TransformUnit))
            .with_unit(NodeKind::Evaluation, Arc::new(EvaluationUnit))
    }

    pub fn register(&mut self, kind: NodeKind, unit: Arc<dyn WorkUnit>) {
        self.units.insert(kind, unit);
    }

    pub fn with_unit(mut self, kind: NodeKind, unit: Arc<dyn WorkUnit>) -> Self {
        self.register(kind, unit);
        self
    }

    pub fn get(&self, kind: &NodeKind) -> Option<Arc<dyn WorkUnit>> {
        self.units.get(kind).cloned()
    }

    pub fn contains(&self, kind: &NodeKind) -> bool {
        self.units.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl fmt::Debug for WorkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.units.keys().map(NodeKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("WorkRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_unit_and_registry() {
        let registry = WorkRegistry::new().with_unit(
            NodeKind::Transform,
            Arc::new(FnUnit::new(|_: &Map<String, Value>, inputs: &WorkInputs| {
                Ok(json!({"count": inputs.upstream.len()}))
            })),
        );

        assert!(registry.contains(&NodeKind::Transform));
        assert!(!registry.contains(&NodeKind::Model));
        assert_eq!(registry.len(), 1);

        let unit = registry.get(&NodeKind::Transform).unwrap();
        let mut inputs = WorkInputs::new();
        inputs.upstream.insert("a".to_string(), json!({"rows": 3}));
        let out = unit.run(&Map::new(), &inputs).await.unwrap();
        assert_eq!(out, json!({"count": 1}));
    }

    #[test]
    fn test_builtin_registry_covers_known_kinds_except_model() {
        let registry = WorkRegistry::builtin();
        assert!(registry.contains(&NodeKind::DataLoader));
        assert!(registry.contains(&NodeKind::Transform));
        assert!(registry.contains(&NodeKind::Evaluation));
        assert!(!registry.contains(&NodeKind::Model));
    }

    #[test]
    fn test_sole_upstream() {
        let mut inputs = WorkInputs::new();
        assert!(inputs.sole_upstream().is_none());
        assert!(inputs.is_empty());

        inputs.upstream.insert("a".to_string(), json!(1));
        assert_eq!(inputs.sole_upstream(), Some(&json!(1)));

        inputs.upstream.insert("b".to_string(), json!(2));
        assert!(inputs.sole_upstream().is_none());
    }
}

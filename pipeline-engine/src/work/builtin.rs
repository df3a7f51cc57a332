// Built-in Work Units
// Placeholder implementations for the standard node kinds. They carry
// the data shapes of real loaders/transforms/evaluators without doing
// any numerical work; callers register real units over the same trait.

use crate::work::{WorkError, WorkInputs, WorkUnit};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

fn config_name(config: &Map<String, Value>) -> String {
    config
        .get("name")
        .or_else(|| config.get("label"))
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string()
}

/// Carries the row count forward from whatever produced it upstream,
/// falling back to a `rows` field on the run input.
fn upstream_rows(inputs: &WorkInputs) -> Value {
    for output in inputs.upstream.values() {
        if let Some(rows) = output.get("rows") {
            return rows.clone();
        }
    }
    inputs
        .run_input
        .as_ref()
        .and_then(|v| v.get("rows"))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Loads a dataset described by the node's configuration
pub struct DataLoaderUnit;

#[async_trait]
impl WorkUnit for DataLoaderUnit {
    async fn run(
        &self,
        config: &Map<String, Value>,
        inputs: &WorkInputs,
    ) -> Result<Value, WorkError> {
        let rows = config
            .get("rows")
            .cloned()
            .or_else(|| {
                inputs
                    .run_input
                    .as_ref()
                    .and_then(|v| v.get("rows"))
                    .cloned()
            })
            .unwrap_or(json!(0));

        Ok(json!({
            "source": config_name(config),
            "rows": rows,
        }))
    }
}

/// Applies a named transformation, passing the dataset shape through
pub struct TransformUnit;

#[async_trait]
impl WorkUnit for TransformUnit {
    async fn run(
        &self,
        config: &Map<String, Value>,
        inputs: &WorkInputs,
    ) -> Result<Value, WorkError> {
        Ok(json!({
            "transform": config_name(config),
            "rows": upstream_rows(inputs),
        }))
    }
}

/// Computes evaluation metrics for an upstream model output
pub struct EvaluationUnit;

#[async_trait]
impl WorkUnit for EvaluationUnit {
    async fn run(
        &self,
        config: &Map<String, Value>,
        inputs: &WorkInputs,
    ) -> Result<Value, WorkError> {
        let metrics = config
            .get("metrics")
            .cloned()
            .unwrap_or_else(|| json!({}));

        Ok(json!({
            "evaluation": config_name(config),
            "metrics": metrics,
            "evaluated": upstream_rows(inputs),
        }))
    }
}

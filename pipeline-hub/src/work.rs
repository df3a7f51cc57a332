// Model Work Unit
// Store-backed work unit for `model` nodes. Resolves the registered
// model record referenced by the node's configuration and emits the
// placeholder prediction shape; real inference would load the model
// artifact from `file_path` instead.

use crate::store::HubStore;

use async_trait::async_trait;
use pipeline_engine::{WorkError, WorkInputs, WorkUnit};
use serde_json::{json, Map, Value};

/// Placeholder predictions keyed off the model type
pub fn mock_predictions(model_type: &str) -> Value {
    if model_type == "classification" {
        json!([0.9, 0.1])
    } else {
        json!([42.5, 67.3, 89.1])
    }
}

pub struct ModelUnit {
    store: HubStore,
}

impl ModelUnit {
    pub fn new(store: HubStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl WorkUnit for ModelUnit {
    async fn run(
        &self,
        config: &Map<String, Value>,
        inputs: &WorkInputs,
    ) -> Result<Value, WorkError> {
        let trained_on = inputs
            .upstream
            .values()
            .find_map(|v| v.get("rows").cloned())
            .unwrap_or(Value::Null);

        // Nodes may reference a registered model; without one they act
        // as an inline, untrained model
        let model_id = config.get("modelId").and_then(Value::as_str);
        let record = match model_id {
            Some(id) => Some(self.store.model(id).await.ok_or_else(|| {
                WorkError::failed(format!("model '{}' is not registered", id))
            })?),
            None => None,
        };

        let (name, version, model_type, file_path) = match &record {
            Some(record) => (
                record.name.clone(),
                record.version.clone(),
                record.model_type.clone(),
                record.file_path.clone(),
            ),
            None => (
                config
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("inline model")
                    .to_string(),
                "unversioned".to_string(),
                config
                    .get("modelType")
                    .and_then(Value::as_str)
                    .unwrap_or("classification")
                    .to_string(),
                None,
            ),
        };

        Ok(json!({
            "model": name,
            "version": version,
            "filePath": file_path,
            "trainedOn": trained_on,
            "predictions": mock_predictions(&model_type),
        }))
    }
}

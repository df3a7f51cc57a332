// Model Handler
// CRUD over registered models plus the standalone predict operation

use crate::error::{HubError, HubResult};
use crate::records::{CreateModel, ModelRecord, ModelUpdate};
use crate::store::HubStore;
use crate::work::mock_predictions;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Result of asking a registered model for predictions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub model_id: String,
    pub model_name: String,
    pub version: String,
    pub predictions: Value,
    pub predicted_at: DateTime<Utc>,
}

pub struct ModelHandler {
    store: HubStore,
}

impl ModelHandler {
    pub fn new(store: HubStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, request: CreateModel) -> HubResult<ModelRecord> {
        if request.name.trim().is_empty() {
            return Err(HubError::invalid_input("model name is required"));
        }
        if request.model_type.trim().is_empty() {
            return Err(HubError::invalid_input("model type is required"));
        }
        if request.version.trim().is_empty() {
            return Err(HubError::invalid_input("model version is required"));
        }

        let mut record = ModelRecord::new(request.name, request.model_type, request.version);
        record.description = request.description;
        record.file_path = request.file_path;
        record.parameters = request.parameters;
        record.metrics = request.metrics;

        info!(model_id = %record.id, name = %record.name, "registered model");
        self.store.insert_model(record.clone()).await;
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> HubResult<ModelRecord> {
        self.store
            .model(id)
            .await
            .ok_or_else(|| HubError::not_found(format!("model '{}'", id)))
    }

    pub async fn list(&self) -> Vec<ModelRecord> {
        self.store.models().await
    }

    pub async fn update(&self, id: &str, update: ModelUpdate) -> HubResult<ModelRecord> {
        self.store
            .update_model(id, |record| {
                if let Some(name) = update.name {
                    record.name = name;
                }
                if let Some(description) = update.description {
                    record.description = description;
                }
                if let Some(model_type) = update.model_type {
                    record.model_type = model_type;
                }
                if let Some(version) = update.version {
                    record.version = version;
                }
                if let Some(file_path) = update.file_path {
                    record.file_path = Some(file_path);
                }
                if let Some(parameters) = update.parameters {
                    record.parameters = parameters;
                }
                if let Some(metrics) = update.metrics {
                    record.metrics = metrics;
                }
            })
            .await
            .ok_or_else(|| HubError::not_found(format!("model '{}'", id)))
    }

    pub async fn delete(&self, id: &str) -> HubResult<()> {
        self.store
            .remove_model(id)
            .await
            .map(|_| ())
            .ok_or_else(|| HubError::not_found(format!("model '{}'", id)))
    }

    /// Run a registered model directly against caller-provided input,
    /// outside of any pipeline
    pub async fn predict(&self, id: &str, _input: Value) -> HubResult<Prediction> {
        let record = self.get(id).await?;
        Ok(Prediction {
            model_id: record.id,
            model_name: record.name,
            version: record.version,
            predictions: mock_predictions(&record.model_type),
            predicted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_request(name: &str, model_type: &str) -> CreateModel {
        CreateModel {
            name: name.to_string(),
            model_type: model_type.to_string(),
            version: "1.0.0".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_required_fields() {
        let handler = ModelHandler::new(HubStore::new());

        let err = handler
            .create(create_request("", "classification"))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));

        let err = handler.create(create_request("m", " ")).await.unwrap_err();
        assert!(matches!(err, HubError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let handler = ModelHandler::new(HubStore::new());

        let record = handler
            .create(create_request("Churn Predictor", "classification"))
            .await
            .unwrap();

        let updated = handler
            .update(
                &record.id,
                ModelUpdate {
                    version: Some("1.1.0".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, "1.1.0");
        assert_eq!(updated.name, "Churn Predictor");

        assert_eq!(handler.list().await.len(), 1);
        handler.delete(&record.id).await.unwrap();
        assert!(handler.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_predict_uses_model_type() {
        let handler = ModelHandler::new(HubStore::new());

        let classifier = handler
            .create(create_request("Churn Predictor", "classification"))
            .await
            .unwrap();
        let forecaster = handler
            .create(create_request("Forecaster", "time_series"))
            .await
            .unwrap();

        let p = handler
            .predict(&classifier.id, json!({"features": [1, 2, 3]}))
            .await
            .unwrap();
        assert_eq!(p.predictions, json!([0.9, 0.1]));
        assert_eq!(p.model_name, "Churn Predictor");

        let p = handler.predict(&forecaster.id, json!({})).await.unwrap();
        assert_eq!(p.predictions, json!([42.5, 67.3, 89.1]));
    }

    #[tokio::test]
    async fn test_predict_missing_model() {
        let handler = ModelHandler::new(HubStore::new());
        assert!(matches!(
            handler.predict("ghost", json!({})).await.unwrap_err(),
            HubError::NotFound(_)
        ));
    }
}

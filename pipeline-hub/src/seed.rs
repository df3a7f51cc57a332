// Sample Data
// Seeds a store with the demo pipelines and models used by fresh
// installations and by tests

use crate::records::{ModelRecord, PipelineRecord};
use crate::store::HubStore;

use pipeline_engine::{Edge, Node, NodeKind, Position};
use serde_json::{json, Map, Value};
use tracing::info;

fn data(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn preprocessing_pipeline() -> PipelineRecord {
    PipelineRecord::new(
        "Data Preprocessing Pipeline",
        "Cleans and normalizes raw CSV data before training",
    )
    .with_graph(
        vec![
            Node::new("node1", NodeKind::DataLoader)
                .at(Position::new(100.0, 100.0))
                .with_data(data(&[
                    ("label", json!("CSV Loader")),
                    ("source", json!("data/raw.csv")),
                ])),
            Node::new("node2", NodeKind::Transform)
                .at(Position::new(300.0, 100.0))
                .with_data(data(&[
                    ("label", json!("Missing Value Imputer")),
                    ("transform", json!("impute_missing")),
                ])),
            Node::new("node3", NodeKind::Transform)
                .at(Position::new(500.0, 100.0))
                .with_data(data(&[
                    ("label", json!("Normalization")),
                    ("transform", json!("normalize")),
                ])),
        ],
        vec![
            Edge::new("edge1", "node1", "node2"),
            Edge::new("edge2", "node2", "node3"),
        ],
    )
}

fn classification_pipeline() -> PipelineRecord {
    PipelineRecord::new(
        "Classification Workflow",
        "End-to-end training and evaluation for a classifier",
    )
    .with_graph(
        vec![
            Node::new("node1", NodeKind::DataLoader)
                .at(Position::new(100.0, 200.0))
                .with_data(data(&[
                    ("label", json!("Database Connector")),
                    ("source", json!("postgres://training")),
                ])),
            Node::new("node2", NodeKind::Transform)
                .at(Position::new(300.0, 200.0))
                .with_data(data(&[
                    ("label", json!("Feature Engineering")),
                    ("transform", json!("engineer_features")),
                ])),
            Node::new("node3", NodeKind::Model)
                .at(Position::new(500.0, 200.0))
                .with_data(data(&[
                    ("label", json!("Random Forest")),
                    ("name", json!("Random Forest")),
                    ("modelType", json!("classification")),
                ])),
            Node::new("node4", NodeKind::Evaluation)
                .at(Position::new(700.0, 200.0))
                .with_data(data(&[
                    ("label", json!("Performance Metrics")),
                    ("evaluation", json!("classification_report")),
                ])),
        ],
        vec![
            Edge::new("edge1", "node1", "node2"),
            Edge::new("edge2", "node2", "node3"),
            Edge::new("edge3", "node3", "node4"),
        ],
    )
}

fn sample_models() -> Vec<ModelRecord> {
    let mut churn = ModelRecord::new("Customer Churn Predictor", "classification", "1.0.0");
    churn.description = "Predicts customer churn probability".to_string();
    churn.file_path = Some("models/churn_model_v1.pkl".to_string());
    churn.parameters = data(&[
        ("algorithm", json!("RandomForest")),
        ("n_estimators", json!(100)),
        ("max_depth", json!(10)),
    ]);
    churn.metrics = data(&[
        ("accuracy", json!(0.89)),
        ("precision", json!(0.87)),
        ("recall", json!(0.85)),
        ("f1_score", json!(0.86)),
    ]);

    let mut recommender = ModelRecord::new("Product Recommendation Engine", "recommendation", "2.1.0");
    recommender.description = "Recommends products based on purchase history".to_string();
    recommender.file_path = Some("models/recommender_v2.pkl".to_string());
    recommender.parameters = data(&[
        ("algorithm", json!("CollaborativeFiltering")),
        ("factors", json!(50)),
        ("iterations", json!(20)),
    ]);
    recommender.metrics = data(&[
        ("rmse", json!(0.92)),
        ("mae", json!(0.74)),
        ("ndcg", json!(0.81)),
    ]);

    let mut forecaster = ModelRecord::new("Time Series Forecaster", "time_series", "1.2.3");
    forecaster.description = "Forecasts weekly demand".to_string();
    forecaster.file_path = Some("models/forecaster_v1.pkl".to_string());
    forecaster.parameters = data(&[
        ("algorithm", json!("ARIMA")),
        ("p", json!(2)),
        ("d", json!(1)),
        ("q", json!(2)),
    ]);
    forecaster.metrics = data(&[
        ("mape", json!(8.4)),
        ("rmse", json!(12.1)),
        ("mae", json!(9.3)),
    ]);

    vec![churn, recommender, forecaster]
}

/// Populate a store with the demo pipelines and registered models.
/// Safe to call on an empty store only; existing records with the same
/// names are not deduplicated.
pub async fn seed_sample_data(store: &HubStore) {
    for record in [preprocessing_pipeline(), classification_pipeline()] {
        info!(name = %record.name, "seeding pipeline");
        store.insert_pipeline(record).await;
    }
    for record in sample_models() {
        info!(name = %record.name, "seeding model");
        store.insert_model(record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_counts() {
        let store = HubStore::new();
        seed_sample_data(&store).await;
        assert_eq!(store.pipeline_count().await, 2);
        assert_eq!(store.model_count().await, 3);
    }

    #[tokio::test]
    async fn test_seeded_pipelines_form_valid_graphs() {
        let store = HubStore::new();
        seed_sample_data(&store).await;

        for record in store.pipelines().await {
            let graph = record.graph().unwrap();
            assert!(graph.validate().is_ok(), "{} should be acyclic", record.name);
        }
    }

    #[tokio::test]
    async fn test_seeded_model_shapes() {
        let store = HubStore::new();
        seed_sample_data(&store).await;

        let models = store.models().await;
        let churn = models
            .iter()
            .find(|m| m.name == "Customer Churn Predictor")
            .unwrap();
        assert_eq!(churn.model_type, "classification");
        assert_eq!(churn.version, "1.0.0");
        assert_eq!(churn.parameters["algorithm"], json!("RandomForest"));
        assert_eq!(churn.metrics["accuracy"], json!(0.89));
        assert_eq!(
            churn.file_path.as_deref(),
            Some("models/churn_model_v1.pkl")
        );
    }
}

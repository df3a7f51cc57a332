// Hub Store
// Explicitly passed, in-memory storage handle for pipeline and model
// records. Cloning is cheap; all clones share the same state. A real
// database would slot in behind the same operations.

use crate::records::{ModelRecord, PipelineRecord};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct StoreInner {
    pipelines: HashMap<String, PipelineRecord>,
    models: HashMap<String, ModelRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct HubStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl HubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_pipeline(&self, record: PipelineRecord) {
        let mut inner = self.inner.write().await;
        inner.pipelines.insert(record.id.clone(), record);
    }

    pub async fn pipeline(&self, id: &str) -> Option<PipelineRecord> {
        self.inner.read().await.pipelines.get(id).cloned()
    }

    /// All pipelines, most recently updated first
    pub async fn pipelines(&self) -> Vec<PipelineRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<PipelineRecord> = inner.pipelines.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    /// Apply a mutation to a stored pipeline under the write lock,
    /// returning the updated record
    pub async fn update_pipeline<F>(&self, id: &str, mutate: F) -> Option<PipelineRecord>
    where
        F: FnOnce(&mut PipelineRecord),
    {
        let mut inner = self.inner.write().await;
        let record = inner.pipelines.get_mut(id)?;
        mutate(record);
        record.touch();
        Some(record.clone())
    }

    pub async fn remove_pipeline(&self, id: &str) -> Option<PipelineRecord> {
        self.inner.write().await.pipelines.remove(id)
    }

    pub async fn insert_model(&self, record: ModelRecord) {
        let mut inner = self.inner.write().await;
        inner.models.insert(record.id.clone(), record);
    }

    pub async fn model(&self, id: &str) -> Option<ModelRecord> {
        self.inner.read().await.models.get(id).cloned()
    }

    /// All models, most recently updated first
    pub async fn models(&self) -> Vec<ModelRecord> {
        let inner = self.inner.read().await;
        let mut records: Vec<ModelRecord> = inner.models.values().cloned().collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records
    }

    pub async fn update_model<F>(&self, id: &str, mutate: F) -> Option<ModelRecord>
    where
        F: FnOnce(&mut ModelRecord),
    {
        let mut inner = self.inner.write().await;
        let record = inner.models.get_mut(id)?;
        mutate(record);
        record.touch();
        Some(record.clone())
    }

    pub async fn remove_model(&self, id: &str) -> Option<ModelRecord> {
        self.inner.write().await.models.remove(id)
    }

    pub async fn pipeline_count(&self) -> usize {
        self.inner.read().await.pipelines.len()
    }

    pub async fn model_count(&self) -> usize {
        self.inner.read().await.models.len()
    }
}

//! Equipment id -> model handle map.
//!
//! Each handle is an async mutex so the pipeline can hold it across the
//! whole ingest of one sample: samples for one unit never interleave, while
//! different units proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{AdaptiveAnomalyModel, ModelSummary};
use crate::config::ModelConfig;
use crate::types::EquipmentId;

pub type ModelHandle = Arc<Mutex<AdaptiveAnomalyModel>>;

pub struct ModelRegistry {
    config: ModelConfig,
    models: DashMap<EquipmentId, ModelHandle>,
}

impl ModelRegistry {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            models: DashMap::new(),
        }
    }

    /// Handle for `id`, creating an empty model on first use
    pub fn handle(&self, id: EquipmentId) -> ModelHandle {
        let entry = self
            .models
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(AdaptiveAnomalyModel::new(self.config.clone()))));
        Arc::clone(entry.value())
    }

    /// Existing handle only
    pub fn get(&self, id: EquipmentId) -> Option<ModelHandle> {
        self.models.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub async fn summary(&self, id: EquipmentId) -> Option<ModelSummary> {
        let handle = self.get(id)?;
        let model = handle.lock().await;
        Some(model.summary())
    }

    /// Number of models created so far
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_one_model_per_equipment() {
        let registry = ModelRegistry::new(ModelConfig::default());
        let a = registry.handle(1);
        let b = registry.handle(1);
        let c = registry.handle(2);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);

        a.lock().await.skip_history();
        assert!(b.lock().await.history_loaded());
        assert!(!c.lock().await.history_loaded());
    }

    #[tokio::test]
    async fn test_summary_for_unknown_is_none() {
        let registry = ModelRegistry::new(ModelConfig::default());
        assert!(registry.summary(9).await.is_none());
        registry.handle(9);
        let summary = registry.summary(9).await.unwrap();
        assert!(!summary.trained);
        assert_eq!(summary.window_capacity, 200);
    }
}

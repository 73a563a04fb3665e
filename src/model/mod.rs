//! Adaptive per-equipment anomaly model
//!
//! Each equipment unit owns one `AdaptiveAnomalyModel`: a bounded FIFO window
//! of recent feature vectors, refit on a cadence into a standard scaler plus
//! an isolation forest. Until the first fit the model answers with a neutral
//! verdict instead of an error.
//!
//! ## Modules
//!
//! - `scaler`: per-feature standardization (statrs)
//! - `isolation_forest`: the outlier scorer
//! - `registry`: equipment id -> model handle map

pub mod isolation_forest;
mod registry;
pub mod scaler;

pub use isolation_forest::{ForestParams, IsolationForest};
pub use registry::{ModelHandle, ModelRegistry};
pub use scaler::StandardScaler;

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{defaults, ModelConfig};
use crate::types::FeatureVector;

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of scoring one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyVerdict {
    pub anomalous: bool,
    /// Monotone in the raw score, in [0, 100]. Not a probability.
    pub confidence: f64,
    /// Raw forest score, present only when a fitted model produced the verdict
    pub raw_score: Option<f64>,
}

impl AnomalyVerdict {
    /// Verdict returned while no fitted model exists
    pub fn neutral() -> Self {
        Self {
            anomalous: false,
            confidence: defaults::NEUTRAL_CONFIDENCE,
            raw_score: None,
        }
    }
}

/// `clamp((1 - |s|) * 100, 0, 100)`
pub fn confidence_from_score(raw_score: f64) -> f64 {
    ((1.0 - raw_score.abs()) * 100.0).clamp(0.0, 100.0)
}

/// Point-in-time view of a model for the API
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub trained: bool,
    pub window_len: usize,
    pub window_capacity: usize,
    pub fits: u64,
    pub last_fit_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Model
// ============================================================================

struct FittedModel {
    scaler: StandardScaler,
    forest: IsolationForest,
}

/// Model state captured before one `observe`, restored by `rollback`
/// when the sample that followed could not be persisted.
pub struct ModelCheckpoint {
    window_len: usize,
    oldest: Option<FeatureVector>,
    fitted: Option<Arc<FittedModel>>,
    since_fit: usize,
    fits: u64,
    last_fit_at: Option<DateTime<Utc>>,
}

pub struct AdaptiveAnomalyModel {
    config: ModelConfig,
    window: VecDeque<FeatureVector>,
    fitted: Option<Arc<FittedModel>>,
    /// Samples observed since the last fit
    since_fit: usize,
    fits: u64,
    last_fit_at: Option<DateTime<Utc>>,
    history_loaded: bool,
}

impl AdaptiveAnomalyModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size + 1),
            config,
            fitted: None,
            since_fit: 0,
            fits: 0,
            last_fit_at: None,
            history_loaded: false,
        }
    }

    /// Append to the window, evicting the oldest vector once over the bound.
    pub fn observe(&mut self, features: FeatureVector) {
        self.window.push_back(features);
        while self.window.len() > self.config.window_size {
            self.window.pop_front();
        }
        self.since_fit += 1;
    }

    pub fn checkpoint(&self) -> ModelCheckpoint {
        ModelCheckpoint {
            window_len: self.window.len(),
            oldest: self.window.front().copied(),
            fitted: self.fitted.clone(),
            since_fit: self.since_fit,
            fits: self.fits,
            last_fit_at: self.last_fit_at,
        }
    }

    /// Undo the single `observe` (and any refit) made since `checkpoint`.
    pub fn rollback(&mut self, checkpoint: ModelCheckpoint) {
        self.window.pop_back();
        if self.window.len() < checkpoint.window_len {
            if let Some(oldest) = checkpoint.oldest {
                self.window.push_front(oldest);
            }
        }
        self.fitted = checkpoint.fitted;
        self.since_fit = checkpoint.since_fit;
        self.fits = checkpoint.fits;
        self.last_fit_at = checkpoint.last_fit_at;
    }

    /// Pre-fill the window from stored history (oldest first).
    ///
    /// Runs once per model; later calls are ignored.
    pub fn seed_history(&mut self, history: impl IntoIterator<Item = FeatureVector>) {
        if self.history_loaded {
            return;
        }
        self.history_loaded = true;
        for features in history {
            self.observe(features);
        }
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    /// Mark history as loaded without seeding (store unavailable, or seeding disabled)
    pub fn skip_history(&mut self) {
        self.history_loaded = true;
    }

    /// Refit on the whole window when it holds enough samples and the
    /// cadence allows. Returns whether a fit happened. A failed fit keeps
    /// the previous model scoring.
    pub fn retrain_if_due(&mut self) -> bool {
        if self.window.len() < self.config.min_training_samples {
            return false;
        }
        if self.fitted.is_some() && self.since_fit < self.config.retrain_every {
            return false;
        }

        let rows: Vec<FeatureVector> = self.window.iter().copied().collect();
        let Some(scaler) = StandardScaler::fit(&rows) else {
            return false;
        };
        let scaled = scaler.transform_all(&rows);
        let params = ForestParams {
            n_trees: self.config.n_trees,
            max_samples: self.config.max_samples,
            contamination: self.config.contamination,
            seed: self.config.seed,
        };

        match IsolationForest::fit(&scaled, params) {
            Ok(forest) => {
                debug!(
                    window = rows.len(),
                    offset = forest.offset(),
                    "Anomaly model refit"
                );
                self.fitted = Some(Arc::new(FittedModel { scaler, forest }));
                self.since_fit = 0;
                self.fits += 1;
                self.last_fit_at = Some(Utc::now());
                true
            }
            Err(e) => {
                warn!(error = %e, "Anomaly model fit failed, keeping previous model");
                false
            }
        }
    }

    /// Score against the current fit, or the neutral verdict when unfitted.
    pub fn score(&self, features: &FeatureVector) -> AnomalyVerdict {
        let Some(fitted) = &self.fitted else {
            return AnomalyVerdict::neutral();
        };
        let scaled = fitted.scaler.transform(features);
        let raw_score = fitted.forest.score_sample(&scaled);
        AnomalyVerdict {
            anomalous: fitted.forest.is_outlier(raw_score),
            confidence: confidence_from_score(raw_score),
            raw_score: Some(raw_score),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            trained: self.is_trained(),
            window_len: self.window.len(),
            window_capacity: self.config.window_size,
            fits: self.fits,
            last_fit_at: self.last_fit_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ModelConfig {
        ModelConfig {
            window_size: 5,
            min_training_samples: 3,
            ..ModelConfig::default()
        }
    }

    fn fv(t: f64) -> FeatureVector {
        FeatureVector([t, 3.0 + t * 0.01, 120.0, 85.0, 92.0])
    }

    #[test]
    fn test_unfitted_model_is_neutral() {
        let model = AdaptiveAnomalyModel::new(ModelConfig::default());
        let verdict = model.score(&fv(70.0));
        assert!(!verdict.anomalous);
        assert_eq!(verdict.confidence, 50.0);
        assert_eq!(verdict.raw_score, None);
        assert!(!model.is_trained());
    }

    #[test]
    fn test_window_is_bounded_fifo() {
        let mut model = AdaptiveAnomalyModel::new(small_config());
        for i in 0..8 {
            model.observe(fv(i as f64));
        }
        assert_eq!(model.window_len(), 5);
        assert_eq!(model.window.front().map(|f| f.get(0)), Some(3.0));
        assert_eq!(model.window.back().map(|f| f.get(0)), Some(7.0));
    }

    #[test]
    fn test_retrain_below_minimum_is_noop() {
        let mut model = AdaptiveAnomalyModel::new(ModelConfig::default());
        for i in 0..9 {
            model.observe(fv(i as f64));
            assert!(!model.retrain_if_due());
        }
        assert!(!model.is_trained());
        assert_eq!(model.score(&fv(1.0)), AnomalyVerdict::neutral());
    }

    #[test]
    fn test_trains_at_minimum_and_every_sample_after() {
        let mut model = AdaptiveAnomalyModel::new(ModelConfig::default());
        for i in 0..10 {
            model.observe(fv(70.0 + i as f64 * 0.1));
        }
        assert!(model.retrain_if_due());
        assert!(model.is_trained());
        // Nothing new observed: not due
        assert!(!model.retrain_if_due());
        model.observe(fv(71.0));
        assert!(model.retrain_if_due());
        assert_eq!(model.summary().fits, 2);
    }

    #[test]
    fn test_retrain_cadence() {
        let mut model = AdaptiveAnomalyModel::new(ModelConfig {
            retrain_every: 3,
            ..ModelConfig::default()
        });
        for i in 0..10 {
            model.observe(fv(i as f64));
        }
        assert!(model.retrain_if_due());
        model.observe(fv(1.0));
        model.observe(fv(2.0));
        assert!(!model.retrain_if_due());
        model.observe(fv(3.0));
        assert!(model.retrain_if_due());
    }

    #[test]
    fn test_rollback_restores_full_window_and_fit() {
        let mut model = AdaptiveAnomalyModel::new(small_config());
        for i in 0..5 {
            model.observe(fv(i as f64));
        }
        assert!(model.retrain_if_due());
        let query = fv(2.0);
        let before = model.score(&query);

        let checkpoint = model.checkpoint();
        model.observe(fv(50.0));
        assert!(model.retrain_if_due());
        assert_eq!(model.summary().fits, 2);
        model.rollback(checkpoint);

        let window: Vec<f64> = model.window.iter().map(|f| f.get(0)).collect();
        assert_eq!(window, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(model.summary().fits, 1);
        assert_eq!(model.score(&query), before);
    }

    #[test]
    fn test_rollback_before_first_fit() {
        let mut model = AdaptiveAnomalyModel::new(small_config());
        model.observe(fv(1.0));
        let checkpoint = model.checkpoint();
        model.observe(fv(2.0));
        model.rollback(checkpoint);
        assert_eq!(model.window_len(), 1);
        assert!(!model.is_trained());
    }

    #[test]
    fn test_seed_history_runs_once() {
        let mut model = AdaptiveAnomalyModel::new(small_config());
        model.seed_history((0..4).map(|i| fv(i as f64)));
        model.seed_history((0..4).map(|i| fv(i as f64)));
        assert!(model.history_loaded());
        assert_eq!(model.window_len(), 4);
    }

    #[test]
    fn test_confidence_mapping() {
        assert_eq!(confidence_from_score(-0.5), 50.0);
        assert!((confidence_from_score(-0.72) - 28.0).abs() < 1e-9);
        assert_eq!(confidence_from_score(-1.5), 0.0);
        assert_eq!(confidence_from_score(0.0), 100.0);
    }

    #[test]
    fn test_far_sample_flagged_after_refit() {
        let mut model = AdaptiveAnomalyModel::new(ModelConfig::default());
        for i in 0..25 {
            let d = (i % 5) as f64 * 0.2;
            model.observe(FeatureVector([70.0 + d, 3.0 + d * 0.1, 120.0 - d, 85.0 + d, 92.0 - d]));
        }
        let far = FeatureVector([100.0, 12.0, 0.0, 85.0, 60.0]);
        model.observe(far);
        assert!(model.retrain_if_due());
        let verdict = model.score(&far);
        assert!(verdict.anomalous, "{verdict:?}");
        assert!(verdict.raw_score.is_some());
    }
}

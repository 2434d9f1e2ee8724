//! Inference engine: classifier trait, tree-ensemble classifier, and
//! latency/throughput accounting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use super::forest::Forest;
use super::objective::{argmax, Objective};

/// Probabilities handed to clients are kept strictly inside (0, 1).
pub const PROBABILITY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("expected {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
    #[error("feature {index} is not a finite number")]
    NonFiniteFeature { index: usize },
    #[error("model produced a non-finite output")]
    NonFiniteOutput,
}

/// Seam for model back-ends.
///
/// Implementations must be safe to call from many request tasks at once.
pub trait Classifier: Send + Sync {
    /// Short description used in logs
    fn name(&self) -> &str;

    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Index of the predicted class
    fn predict(&self, features: &[f64]) -> Result<usize, InferenceError>;

    /// Per-class probabilities, when the back-end can produce them
    fn predict_proba(&self, _features: &[f64]) -> Option<Result<Vec<f64>, InferenceError>> {
        None
    }
}

/// Gradient-boosted tree classifier.
#[derive(Debug, Clone)]
pub struct GbdtClassifier {
    forest: Forest,
    objective: Objective,
    n_features: usize,
    name: String,
}

impl GbdtClassifier {
    pub fn new(forest: Forest, objective: Objective, n_features: usize) -> Self {
        let name = format!(
            "gbdt ({:?}, {} trees, {} groups)",
            objective,
            forest.n_trees(),
            forest.n_groups()
        );
        Self { forest, objective, n_features, name }
    }

    fn probabilities(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if features.len() != self.n_features {
            return Err(InferenceError::FeatureCountMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        if let Some(index) = features.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteFeature { index });
        }

        let raw = self.forest.predict_raw(features);
        let proba = self.objective.transform(&raw);

        if proba.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFiniteOutput);
        }
        Ok(proba)
    }
}

impl Classifier for GbdtClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.objective.n_classes(self.forest.n_groups() as usize)
    }

    fn predict(&self, features: &[f64]) -> Result<usize, InferenceError> {
        self.probabilities(features).map(|p| argmax(&p))
    }

    fn predict_proba(&self, features: &[f64]) -> Option<Result<Vec<f64>, InferenceError>> {
        Some(self.probabilities(features))
    }
}

/// Engine statistics for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub inference_count: u64,
    pub avg_latency_ms: f64,
}

/// Loaded classifier plus counters shared by all requests.
pub struct Engine {
    classifier: Box<dyn Classifier>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl Engine {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self {
            classifier,
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Predict a class index, recording latency.
    pub fn predict(&self, features: &[f64]) -> Result<usize, InferenceError> {
        let start = Instant::now();
        let result = self.classifier.predict(features);

        self.latency_sum_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        result
    }

    /// Per-class probabilities clipped to `[ε, 1 - ε]`.
    pub fn predict_proba(&self, features: &[f64]) -> Option<Result<Vec<f64>, InferenceError>> {
        self.classifier.predict_proba(features).map(|result| {
            result.map(|proba| {
                proba
                    .into_iter()
                    .map(|p| p.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON))
                    .collect()
            })
        })
    }

    pub fn stats(&self) -> EngineStats {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 { (sum as f64 / count as f64) / 1000.0 } else { 0.0 };

        EngineStats {
            inference_count: count,
            avg_latency_ms: avg,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("classifier", &self.classifier.name())
            .field("stats", &self.stats())
            .finish()
    }
}

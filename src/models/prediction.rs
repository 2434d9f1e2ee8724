//! Prediction model

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::inference::{ModelMetadata, ReferenceRange};

/// Metadata echoed back with every prediction
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub version: String,
    pub features_used: Vec<String>,
    pub reference_ranges: BTreeMap<String, ReferenceRange>,
}

impl From<&ModelMetadata> for ModelInfo {
    fn from(metadata: &ModelMetadata) -> Self {
        Self {
            version: metadata.version.clone(),
            features_used: metadata.features.clone(),
            reference_ranges: metadata.reference_ranges.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub model_metadata: ModelInfo,

    /// Class name → probability, in class order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_scores: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub abnormal_values: Option<Map<String, Value>>,
}

impl PredictionResponse {
    pub fn new(prediction: String, metadata: &ModelMetadata) -> Self {
        Self {
            prediction,
            model_metadata: ModelInfo::from(metadata),
            confidence_scores: None,
            warning: None,
            abnormal_values: None,
        }
    }

    /// Attach per-class probabilities keyed by class name.
    pub fn with_confidence(mut self, class_names: &[String], proba: &[f64]) -> Self {
        let scores = class_names
            .iter()
            .zip(proba.iter())
            .map(|(name, &p)| (name.clone(), Value::from(p)))
            .collect();
        self.confidence_scores = Some(scores);
        self
    }

    /// Record abnormal parameters. Replaces any earlier warning.
    pub fn with_alerts(mut self, alerts: Map<String, Value>) -> Self {
        if !alerts.is_empty() {
            self.warning = Some("Abnormal parameters detected".to_string());
            self.abnormal_values = Some(alerts);
        }
        self
    }
}

//! CBC request interpretation
//!
//! Turns a JSON request body into a model-ordered feature vector and
//! flags values outside their clinical reference ranges.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::inference::{ModelMetadata, ReferenceRange};

/// Feature values in model order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// A parameter outside its reference range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbnormalValue {
    pub value: f64,
    pub normal_range: ReferenceRange,
    pub unit: String,
}

/// Extract the model's features from a request body.
///
/// Every feature must be present; values are coerced leniently (numbers,
/// numeric strings, booleans, and declared categorical labels). Keys the
/// model doesn't use are ignored.
pub fn parse_features(body: &Value, metadata: &ModelMetadata) -> Result<FeatureVector, AppError> {
    let object = body.as_object().ok_or(AppError::NotAnObject)?;

    let missing: Vec<String> = metadata
        .features
        .iter()
        .filter(|f| !object.contains_key(f.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(AppError::MissingParameters(missing));
    }

    let mut values = Vec::with_capacity(metadata.features.len());
    let mut invalid = Vec::new();

    for feature in &metadata.features {
        match coerce(feature, &object[feature.as_str()], metadata) {
            Some(v) => values.push(v),
            None => invalid.push(feature.clone()),
        }
    }

    if !invalid.is_empty() {
        return Err(AppError::InvalidNumeric(invalid));
    }

    Ok(FeatureVector { values })
}

fn coerce(feature: &str, value: &Value, metadata: &ModelMetadata) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<f64>().ok().or_else(|| {
                metadata
                    .categorical_encodings
                    .get(feature)
                    .and_then(|codes| codes.get(trimmed))
                    .copied()
            })
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };

    number.filter(|v| v.is_finite())
}

/// Compare features against reference ranges (bounds inclusive).
///
/// Only parameters that are both ranged and model features are checked.
pub fn check_reference_ranges(
    features: &FeatureVector,
    metadata: &ModelMetadata,
) -> Map<String, Value> {
    let mut alerts = Map::new();

    for (idx, feature) in metadata.features.iter().enumerate() {
        let Some(range) = metadata.reference_ranges.get(feature) else {
            continue;
        };

        let value = features.values[idx];
        if !range.contains(value) {
            let abnormal = AbnormalValue {
                value,
                normal_range: *range,
                unit: metadata.unit(feature).to_string(),
            };
            // AbnormalValue only holds finite numbers and strings
            if let Ok(v) = serde_json::to_value(abnormal) {
                alerts.insert(feature.clone(), v);
            }
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> ModelMetadata {
        let mut metadata = ModelMetadata::fallback();
        metadata.units.insert("HGB".into(), "g/dL".into());
        metadata
            .categorical_encodings
            .insert("Sex".into(), [("M".to_string(), 1.0), ("F".to_string(), 0.0)].into());
        metadata
    }

    fn normal_body() -> Value {
        json!({
            "Age": 40, "Sex": 1, "RBC": 4.8, "PCV": 42.0,
            "MCV": 90.0, "MCHC": 34.0, "RDW": 13.0, "HGB": 14.0
        })
    }

    #[test]
    fn test_parse_in_feature_order() {
        let body = json!({
            "HGB": 14.0, "RDW": 13.0, "MCHC": 34.0, "MCV": 90.0,
            "PCV": 42.0, "RBC": 4.8, "Sex": 1, "Age": 40, "Notes": "ignored"
        });

        let features = parse_features(&body, &metadata()).unwrap();
        assert_eq!(features.as_slice(), &[40.0, 1.0, 4.8, 42.0, 90.0, 34.0, 13.0, 14.0]);
    }

    #[test]
    fn test_missing_parameters_listed_in_order() {
        let body = json!({"Age": 40, "Sex": 1, "RBC": 4.8, "PCV": 42.0, "MCV": 90.0});

        match parse_features(&body, &metadata()) {
            Err(AppError::MissingParameters(missing)) => {
                assert_eq!(missing, vec!["MCHC", "RDW", "HGB"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_lenient_coercion() {
        let mut body = normal_body();
        body["Age"] = json!(" 52 ");
        body["Sex"] = json!("F");
        body["HGB"] = json!("11.2");

        let features = parse_features(&body, &metadata()).unwrap();
        assert_eq!(features.as_slice()[0], 52.0);
        assert_eq!(features.as_slice()[1], 0.0);
        assert_eq!(features.as_slice()[7], 11.2);

        body["Sex"] = json!(true);
        assert_eq!(parse_features(&body, &metadata()).unwrap().as_slice()[1], 1.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut body = normal_body();
        body["HGB"] = json!("abc");
        body["MCV"] = Value::Null;
        body["RDW"] = json!([13.0]);
        body["Sex"] = json!("X");

        match parse_features(&body, &metadata()) {
            Err(AppError::InvalidNumeric(params)) => {
                assert_eq!(params, vec!["Sex", "MCV", "RDW", "HGB"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut body = normal_body();
        body["RBC"] = json!("NaN");
        assert!(matches!(
            parse_features(&body, &metadata()),
            Err(AppError::InvalidNumeric(_))
        ));
    }

    #[test]
    fn test_non_object_body() {
        assert!(matches!(
            parse_features(&json!([1, 2, 3]), &metadata()),
            Err(AppError::NotAnObject)
        ));
    }

    #[test]
    fn test_reference_ranges() {
        let mut body = normal_body();
        body["HGB"] = json!(9.5);
        body["MCV"] = json!(100.0); // upper bound is still normal
        body["RDW"] = json!(15.1);

        let metadata = metadata();
        let features = parse_features(&body, &metadata).unwrap();
        let alerts = check_reference_ranges(&features, &metadata);

        let keys: Vec<&String> = alerts.keys().collect();
        assert_eq!(keys, vec!["RDW", "HGB"]);
        assert_eq!(
            alerts["HGB"],
            json!({"value": 9.5, "normal_range": [12.0, 16.0], "unit": "g/dL"})
        );
        assert_eq!(alerts["RDW"]["unit"], json!(""));
    }

    #[test]
    fn test_all_normal() {
        let metadata = metadata();
        let features = parse_features(&normal_body(), &metadata).unwrap();
        assert!(check_reference_ranges(&features, &metadata).is_empty());
    }
}

//! Prediction handler

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::clinical::{check_reference_ranges, parse_features};
use crate::models::PredictionResponse;
use crate::{AppError, AppResult, AppState};

/// Classify one set of CBC parameters
pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<PredictionResponse>> {
    let engine = state.engine.as_ref().ok_or(AppError::ModelNotLoaded)?;
    let metadata = state.metadata.as_ref();

    if !is_json(&headers) {
        return Err(AppError::NotJson);
    }
    let body: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedJson(e.to_string()))?;

    let features = parse_features(&body, metadata)?;

    // Out-of-range values are reported, never rejected
    let alerts = check_reference_ranges(&features, metadata);

    let request_id = Uuid::new_v4();

    let class_idx = engine.predict(features.as_slice()).map_err(|e| {
        tracing::error!(%request_id, "Input features: {:?}", features.as_slice());
        tracing::error!(%request_id, "Expected features: {:?}", metadata.features);
        AppError::PredictionFailed(e.to_string())
    })?;

    let prediction = metadata
        .class_names
        .get(class_idx)
        .cloned()
        .ok_or_else(|| AppError::PredictionFailed(format!("class index {} has no name", class_idx)))?;

    let mut response = PredictionResponse::new(prediction, metadata);

    match engine.predict_proba(features.as_slice()) {
        Some(Ok(proba)) => {
            response = response.with_confidence(&metadata.class_names, &proba);
        }
        Some(Err(e)) => {
            tracing::error!(%request_id, "Probability error: {}", e);
            response.warning = Some("Confidence estimates unavailable".to_string());
        }
        None => {}
    }

    let response = response.with_alerts(alerts);

    tracing::info!(
        %request_id,
        prediction = %response.prediction,
        abnormal = response.abnormal_values.as_ref().map_or(0, |a| a.len()),
        "Prediction served"
    );

    Ok(Json(response))
}

/// `application/json` or any `application/*+json` media type
fn is_json(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    let mime = value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

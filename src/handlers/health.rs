//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::inference::EngineStats;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    features: Vec<String>,
    class_names: Vec<String>,
    version: &'static str,
    model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_checksum: Option<String>,
    #[serde(flatten)]
    stats: EngineStats,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state
        .engine
        .as_ref()
        .map(|engine| engine.stats())
        .unwrap_or(EngineStats {
            inference_count: 0,
            avg_latency_ms: 0.0,
        });

    Json(HealthResponse {
        status: if state.model_loaded() { "healthy" } else { "degraded" },
        model_loaded: state.model_loaded(),
        features: state.metadata.features.clone(),
        class_names: state.metadata.class_names.clone(),
        version: env!("CARGO_PKG_VERSION"),
        model_version: state.metadata.version.clone(),
        model_checksum: state.model_checksum.clone(),
        stats,
        timestamp: chrono::Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_healthy() {
        let (status, body) = send_json(loaded_app(), get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["features"], json!(["HGB", "MCV"]));
        assert_eq!(body["class_names"], json!(["No_Anemia", "Microcytic", "Normocytic"]));
        assert_eq!(body["model_version"], "2.1");
        assert_eq!(body["model_checksum"], "abc123");
        assert_eq!(body["inference_count"], 0);
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_degraded() {
        let (status, body) = send_json(degraded_app(), get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["features"].as_array().unwrap().len(), 8);
        assert_eq!(body["class_names"][3], "Moderate_iron_deficiency_anemia");
        assert!(body.get("model_checksum").is_none());
    }
}

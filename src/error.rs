//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Model errors
    ModelNotLoaded,
    PredictionFailed(String),

    // Request format errors
    NotJson,
    MalformedJson(String),
    NotAnObject,

    // Validation errors
    MissingParameters(Vec<String>),
    InvalidNumeric(Vec<String>),

    // Routing errors
    NotFound,
    MethodNotAllowed,

    // Generic errors
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::ModelNotLoaded => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Model not loaded",
                    "message": "The ML model failed to load. Please check the server logs."
                }),
            ),
            AppError::PredictionFailed(msg) => {
                tracing::error!("Prediction error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": format!("Prediction failed: {}", msg) }),
                )
            }
            AppError::NotJson => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request must be JSON" }),
            ),
            AppError::MalformedJson(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Malformed JSON body: {}", msg) }),
            ),
            AppError::NotAnObject => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request body must be a JSON object" }),
            ),
            AppError::MissingParameters(missing) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Missing parameters: {}", python_list(&missing)) }),
            ),
            AppError::InvalidNumeric(params) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid numeric values detected",
                    "parameters": params
                }),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "Endpoint not found. Available endpoints: GET /, POST /predict, GET /health"
                }),
            ),
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({ "error": "Method not allowed" }),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error", "details": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Render names the way clients of this API already parse them: `['A', 'B']`
fn python_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_list() {
        assert_eq!(python_list(&[]), "[]");
        assert_eq!(
            python_list(&["HGB".to_string(), "MCV".to_string()]),
            "['HGB', 'MCV']"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::ModelNotLoaded.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::NotJson.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::MissingParameters(vec!["Age".into()]).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::MethodNotAllowed.into_response().status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            AppError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

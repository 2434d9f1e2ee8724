//! HTTP handlers

pub mod home;
pub mod predict;
pub mod health;

use crate::AppError;

/// Fallback for unknown paths
pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Fallback for known paths hit with the wrong method
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::inference::{Classifier, InferenceError};
    use axum::body::Body;
    use axum::http::{header::CONTENT_TYPE, Request, StatusCode};

    struct Panicking;

    impl Classifier for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn n_features(&self) -> usize {
            2
        }

        fn n_classes(&self) -> usize {
            3
        }

        fn predict(&self, _features: &[f64]) -> Result<usize, InferenceError> {
            panic!("forest exploded")
        }
    }

    #[tokio::test]
    async fn test_unknown_path_is_json_404() {
        let (status, body) = send_json(loaded_app(), get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"],
            "Endpoint not found. Available endpoints: GET /, POST /predict, GET /health"
        );
    }

    #[tokio::test]
    async fn test_wrong_method_is_json_405() {
        let (status, body) = send_json(loaded_app(), get("/predict")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "Method not allowed");

        let request = Request::builder()
            .method("DELETE")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send_json(loaded_app(), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_handler_panic_is_json_500() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"HGB": 14.0, "MCV": 90.0}"#))
            .unwrap();

        let (status, body) = send_json(app_with_classifier(Panicking), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["details"], "forest exploded");
    }
}

//! Anemia Classification Server
//!
//! Serves a pre-trained tree-ensemble classifier over HTTP. Clients post
//! Complete Blood Count (CBC) parameters and receive the predicted anemia
//! class, per-class confidence scores and any values outside clinical
//! reference ranges.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ANEMIA CLASSIFICATION SERVER                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────────┐  ┌─────────────────────┐ │
//! │  │  HTTP     │  │  Clinical     │  │  Inference Engine   │ │
//! │  │  Routes   │─▶│  Validation   │─▶│  (GBDT forest)      │ │
//! │  │  (Axum)   │  │  (ranges)     │  │                     │ │
//! │  └───────────┘  └───────────────┘  └──────────┬──────────┘ │
//! │                                               ▼            │
//! │                                     ┌──────────────────┐   │
//! │                                     │  Model package   │   │
//! │                                     │  (JSON / LightGBM)│  │
//! │                                     └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod clinical;
pub mod inference;
pub mod models;
pub mod handlers;

use std::any::Any as PanicPayload;
use std::sync::Arc;

use axum::{
    Router,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};

pub use error::{AppError, AppResult};

use config::Config;
use inference::{Engine, ModelMetadata, ModelPackage};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// `None` when the model failed to load (degraded mode)
    pub engine: Option<Arc<Engine>>,
    pub metadata: Arc<ModelMetadata>,
    pub model_checksum: Option<String>,
    pub config: Config,
}

impl AppState {
    /// State backed by a loaded model package
    pub fn loaded(config: Config, package: ModelPackage) -> Self {
        Self {
            engine: Some(Arc::new(Engine::new(Box::new(package.classifier)))),
            metadata: Arc::new(package.metadata),
            model_checksum: Some(package.checksum),
            config,
        }
    }

    /// State without a model; requests are answered from fallback metadata
    pub fn degraded(config: Config) -> Self {
        Self {
            engine: None,
            metadata: Arc::new(ModelMetadata::fallback()),
            model_checksum: None,
            config,
        }
    }

    pub fn model_loaded(&self) -> bool {
        self.engine.is_some()
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::home::index).fallback(handlers::method_not_allowed))
        .route("/predict", post(handlers::predict::predict).fallback(handlers::method_not_allowed))
        .route("/health", get(handlers::health::check).fallback(handlers::method_not_allowed))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

/// A panicking handler answers with the generic 500 body
fn handle_panic(err: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    AppError::Internal(details).into_response()
}

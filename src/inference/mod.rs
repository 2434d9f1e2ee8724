//! Inference Module - tree-ensemble classifier
//!
//! Model artifacts are loaded once at startup into an [`Engine`] that is
//! shared read-only across requests.

pub mod tree;
pub mod forest;
pub mod objective;
pub mod lightgbm;
pub mod engine;
pub mod package;

// Re-export common types
pub use engine::{Classifier, Engine, EngineStats, GbdtClassifier, InferenceError};
pub use objective::Objective;
pub use package::{ModelError, ModelMetadata, ModelPackage, ReferenceRange};

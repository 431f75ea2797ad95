//! Risk Inference Engine
//!
//! Wraps the trained multi-class classifier. Gradient-boosted models saved as
//! XGBoost JSON are evaluated natively; ONNX exports run through tract.

mod classifier;
mod engine;
mod onnx;
mod xgboost;

pub use classifier::{argmax, load_classifier, softmax, Classifier, ModelFormat, OutputKind};
pub use engine::{InferenceEngine, PredictionResult};
pub use onnx::OnnxClassifier;
pub use xgboost::TreeEnsemble;

use thiserror::Error;

/// Errors during model loading and inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Model artifacts disagree: {0}")]
    ArtifactMismatch(String),
}

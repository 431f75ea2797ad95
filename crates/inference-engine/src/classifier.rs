//! Classifier Backends

use crate::onnx::OnnxClassifier;
use crate::xgboost::TreeEnsemble;
use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Serialized model formats the service can load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// XGBoost `save_model` JSON, evaluated natively
    #[default]
    XgboostJson,
    /// ONNX graph run through tract
    Onnx,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::XgboostJson => "xgboost_json",
            ModelFormat::Onnx => "onnx",
        }
    }
}

/// What an ONNX graph's class output holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Per-class probabilities, already normalised by the graph
    #[default]
    Probabilities,
    /// Raw per-class margins, turned into probabilities with softmax
    Margins,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Probabilities => "probabilities",
            OutputKind::Margins => "margins",
        }
    }

    /// Turn one output row into a distribution over the class axis
    pub fn to_distribution(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if row.iter().any(|v| !v.is_finite()) {
            return Err(InferenceError::InferenceFailed(
                "classifier produced a non-finite output".to_string(),
            ));
        }

        match self {
            OutputKind::Margins => Ok(softmax(row)),
            OutputKind::Probabilities => {
                let sum: f64 = row.iter().sum();
                if row.iter().any(|v| *v < 0.0) || (sum - 1.0).abs() > 1e-3 {
                    return Err(InferenceError::InferenceFailed(format!(
                        "output row {:?} is not a probability distribution (sum {})",
                        row, sum
                    )));
                }
                Ok(row.iter().map(|v| v / sum).collect())
            }
        }
    }
}

/// A trained multi-class classifier with probability output
pub trait Classifier: Send + Sync {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    fn num_classes(&self) -> usize;

    fn num_features(&self) -> usize;

    /// Feature names stored in the model file, when it carries any
    fn feature_names(&self) -> Option<&[String]>;

    /// Class probabilities per row, in class-index order
    fn predict_proba(&self, rows: &[&[f64]]) -> Result<Vec<Vec<f64>>, InferenceError>;

    /// Global importance per feature position, normalised to sum to 1
    /// (all zero when the model has none)
    fn feature_importance(&self) -> Vec<f64>;
}

/// Load a classifier from disk. `output` and `importance_path` apply to ONNX
/// graphs only; XGBoost JSON carries both itself.
pub fn load_classifier(
    format: ModelFormat,
    model_path: impl AsRef<Path>,
    importance_path: Option<&Path>,
    output: OutputKind,
) -> Result<Arc<dyn Classifier>, InferenceError> {
    let model_path = model_path.as_ref();
    match format {
        ModelFormat::XgboostJson => Ok(Arc::new(TreeEnsemble::load(model_path)?)),
        ModelFormat::Onnx => Ok(Arc::new(OnnxClassifier::load(
            model_path,
            importance_path,
            output,
        )?)),
    }
}

/// Numerically stable softmax
pub fn softmax(margins: &[f64]) -> Vec<f64> {
    let max = margins.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = margins.iter().map(|m| (m - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties go to the lowest index
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, value) in values.iter().copied().enumerate() {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Normalise raw importance scores so they sum to 1
pub(crate) fn normalise(scores: Vec<f64>) -> Vec<f64> {
    let total: f64 = scores.iter().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores
        .into_iter()
        .map(|v| if v.is_finite() && v > 0.0 { v / total } else { 0.0 })
        .collect()
}

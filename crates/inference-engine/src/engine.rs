//! Inference Engine Implementation

use crate::classifier::{argmax, load_classifier, Classifier, ModelFormat, OutputKind};
use crate::InferenceError;
use feature_engine::{AlignedFeatureVector, FeatureSchema};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Prediction for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Index into the class-label list
    pub class_index: usize,
    /// Label at `class_index`
    pub predicted_class: String,
    /// Probability of the predicted class
    pub confidence: f64,
    /// Probabilities for each class, in label order
    pub probabilities: Vec<f64>,
}

/// Classifier bound to the schema it was trained against
pub struct InferenceEngine {
    schema: Arc<FeatureSchema>,
    classifier: Option<Arc<dyn Classifier>>,
}

impl InferenceEngine {
    /// Create an engine with no classifier loaded yet
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self {
            schema,
            classifier: None,
        }
    }

    /// Create an engine around an already loaded classifier
    pub fn with_classifier(
        schema: Arc<FeatureSchema>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self, InferenceError> {
        let mut engine = Self::new(schema);
        engine.load(classifier)?;
        Ok(engine)
    }

    /// Install a classifier after checking it agrees with the schema
    pub fn load(&mut self, classifier: Arc<dyn Classifier>) -> Result<(), InferenceError> {
        check_artifacts(&self.schema, classifier.as_ref())?;

        info!(
            "Inference engine ready: {} model, {} features, {} classes",
            classifier.kind(),
            classifier.num_features(),
            classifier.num_classes()
        );
        self.classifier = Some(classifier);
        Ok(())
    }

    /// Load a classifier file and install it
    pub fn load_from_path(
        &mut self,
        format: ModelFormat,
        model_path: impl AsRef<Path>,
        importance_path: Option<&Path>,
        output: OutputKind,
    ) -> Result<(), InferenceError> {
        let classifier = load_classifier(format, model_path, importance_path, output)?;
        self.load(classifier)
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn class_labels(&self) -> &[String] {
        self.schema.class_labels()
    }

    fn classifier(&self) -> Result<&dyn Classifier, InferenceError> {
        self.classifier.as_deref().ok_or(InferenceError::ModelNotLoaded)
    }

    /// Score a batch in one classifier call; output order matches input order
    pub fn predict(
        &self,
        vectors: &[AlignedFeatureVector],
    ) -> Result<Vec<PredictionResult>, InferenceError> {
        let classifier = self.classifier()?;
        let start = std::time::Instant::now();

        let expected = self.schema.feature_count();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("[{}, {}]", vectors.len(), expected),
                actual: format!("row of width {}", bad.len()),
            });
        }

        let rows: Vec<&[f64]> = vectors.iter().map(AlignedFeatureVector::as_slice).collect();
        let distributions = classifier.predict_proba(&rows)?;

        if distributions.len() != vectors.len() {
            return Err(InferenceError::InferenceFailed(format!(
                "classifier returned {} rows for {} inputs",
                distributions.len(),
                vectors.len()
            )));
        }

        let labels = self.schema.class_labels();
        let results = distributions
            .into_iter()
            .map(|probabilities| {
                let class_index = argmax(&probabilities)
                    .filter(|idx| *idx < labels.len() && probabilities.len() == labels.len())
                    .ok_or_else(|| {
                        InferenceError::InferenceFailed(format!(
                            "distribution over {} classes for {} labels",
                            probabilities.len(),
                            labels.len()
                        ))
                    })?;
                Ok(PredictionResult {
                    class_index,
                    predicted_class: labels[class_index].clone(),
                    confidence: probabilities[class_index],
                    probabilities,
                })
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        debug!(
            "Inference completed for {} rows in {}ms",
            results.len(),
            start.elapsed().as_millis()
        );
        Ok(results)
    }

    /// Global feature importance by schema name, highest first
    pub fn feature_importance(&self) -> Result<Vec<(String, f64)>, InferenceError> {
        let scores = self.classifier()?.feature_importance();

        let mut ranked: Vec<(String, f64)> = self
            .schema
            .feature_names()
            .iter()
            .cloned()
            .zip(scores)
            .collect();
        // Stable sort keeps schema order among equal scores
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked)
    }
}

/// Classifier, class labels and schema must describe the same model
fn check_artifacts(schema: &FeatureSchema, classifier: &dyn Classifier) -> Result<(), InferenceError> {
    let labels = schema.class_labels().len();
    if classifier.num_classes() != labels {
        return Err(InferenceError::ArtifactMismatch(format!(
            "model predicts {} classes but {} class labels are configured",
            classifier.num_classes(),
            labels
        )));
    }

    if classifier.num_features() != schema.feature_count() {
        return Err(InferenceError::ArtifactMismatch(format!(
            "model expects {} features but the schema lists {}",
            classifier.num_features(),
            schema.feature_count()
        )));
    }

    if let Some(names) = classifier.feature_names() {
        if let Some((idx, (model, expected))) = names
            .iter()
            .zip(schema.feature_names())
            .enumerate()
            .find(|(_, (model, expected))| model != expected)
        {
            return Err(InferenceError::ArtifactMismatch(format!(
                "feature {} is {} in the model but {} in the schema",
                idx, model, expected
            )));
        }
    }

    Ok(())
}

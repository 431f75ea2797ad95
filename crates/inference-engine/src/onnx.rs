//! ONNX Classifier (tract)

use crate::classifier::{normalise, Classifier, OutputKind};
use crate::InferenceError;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::tract_core::internal::DimLike;
use tracing::{debug, info, warn};

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Classifier exported to ONNX, evaluated with tract.
///
/// The graph must take one `f32` input of shape `[N, features]` and expose an
/// `f32` output of shape `[N, classes]`. Whether that output holds
/// probabilities or margins is configured, never inferred from the values.
pub struct OnnxClassifier {
    plan: OnnxPlan,
    output_slot: usize,
    output_kind: OutputKind,
    num_features: usize,
    num_classes: usize,
    importance: Vec<f64>,
}

impl OnnxClassifier {
    /// Load an ONNX model, with global importance read from an optional JSON
    /// array sidecar (one score per feature position)
    pub fn load(
        path: impl AsRef<Path>,
        importance_path: Option<&Path>,
        output_kind: OutputKind,
    ) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let fail = |e: TractError| {
            InferenceError::ModelLoadError(format!("{}: {}", path.display(), e))
        };

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(fail)?
            .into_optimized()
            .map_err(fail)?;

        let input = model.input_fact(0).map_err(fail)?;
        let num_features = match (input.rank(), input.shape.iter().last()) {
            (2, Some(dim)) => dim.to_usize().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            InferenceError::ModelLoadError(format!(
                "{}: input must be a [N, features] matrix with a fixed feature count",
                path.display()
            ))
        })?;

        let outputs = model.output_outlets().map_err(fail)?.to_vec();
        let (output_slot, num_classes) = outputs
            .iter()
            .enumerate()
            .find_map(|(slot, outlet)| {
                let fact = model.outlet_fact(*outlet).ok()?;
                if fact.datum_type != f32::datum_type() || fact.rank() != 2 {
                    return None;
                }
                fact.shape[1].to_usize().ok().map(|classes| (slot, classes))
            })
            .ok_or_else(|| {
                InferenceError::ModelLoadError(format!(
                    "{}: no f32 [N, classes] output (export without zipmap)",
                    path.display()
                ))
            })?;

        let plan = model.into_runnable().map_err(fail)?;

        let importance = match importance_path {
            Some(p) => read_importance(p, num_features)?,
            None => {
                warn!("No feature importance file for ONNX model, importance reported as 0");
                vec![0.0; num_features]
            }
        };

        info!(
            path = %path.display(),
            features = num_features,
            classes = num_classes,
            output = output_kind.as_str(),
            "ONNX model loaded"
        );

        Ok(Self {
            plan,
            output_slot,
            output_kind,
            num_features,
            num_classes,
            importance,
        })
    }

    fn run(&self, rows: &[&[f64]]) -> TractResult<Vec<Vec<f64>>> {
        let data: Vec<f32> = rows.iter().flat_map(|row| row.iter().map(|v| *v as f32)).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((rows.len(), self.num_features), data)?.into();

        let outputs = self.plan.run(tvec!(input.into()))?;
        let view = outputs[self.output_slot].to_array_view::<f32>()?;
        let values: Vec<f64> = view.iter().map(|v| *v as f64).collect();

        if values.len() != rows.len() * self.num_classes {
            anyhow::bail!(
                "output holds {} values for {} rows of {} classes",
                values.len(),
                rows.len(),
                self.num_classes
            );
        }
        Ok(values.chunks(self.num_classes).map(<[f64]>::to_vec).collect())
    }
}

impl Classifier for OnnxClassifier {
    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    fn predict_proba(&self, rows: &[&[f64]]) -> Result<Vec<Vec<f64>>, InferenceError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(row) = rows.iter().find(|row| row.len() != self.num_features) {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("[_, {}]", self.num_features),
                actual: format!("[_, {}]", row.len()),
            });
        }

        // Graphs exported with a fixed batch of 1 reject the full matrix
        let raw = match self.run(rows) {
            Ok(raw) => raw,
            Err(e) if rows.len() > 1 => {
                debug!("Batched ONNX run failed ({}), scoring row by row", e);
                let mut raw = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut out = self
                        .run(std::slice::from_ref(row))
                        .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;
                    raw.append(&mut out);
                }
                raw
            }
            Err(e) => return Err(InferenceError::InferenceFailed(e.to_string())),
        };

        raw.iter()
            .map(|row| self.output_kind.to_distribution(row))
            .collect()
    }

    fn feature_importance(&self) -> Vec<f64> {
        self.importance.clone()
    }
}

fn read_importance(path: &Path, num_features: usize) -> Result<Vec<f64>, InferenceError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        InferenceError::ModelLoadError(format!("cannot read {}: {}", path.display(), e))
    })?;
    let scores: Vec<f64> = serde_json::from_str(&json).map_err(|e| {
        InferenceError::ModelLoadError(format!("importance file {}: {}", path.display(), e))
    })?;

    if scores.len() != num_features {
        return Err(InferenceError::ArtifactMismatch(format!(
            "importance file lists {} scores for {} features",
            scores.len(),
            num_features
        )));
    }
    Ok(normalise(scores))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{argmax, softmax};
    use std::io::Write;

    // Both fixtures compute logits = x * W + b for three features and four
    // classes: feature i votes for class i, an all-zero row lands in class 3.
    fn fixture(name: &str) -> String {
        format!("{}/testdata/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn logits(row: &[f64]) -> Vec<f64> {
        vec![2.0 * row[0], 2.0 * row[1], 2.0 * row[2], 1.0 - row.iter().sum::<f64>()]
    }

    const ROWS: [[f64; 3]; 4] = [
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
    ];

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-5, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxClassifier::load("/nonexistent/model.onnx", None, OutputKind::Probabilities);
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }

    #[test]
    fn test_garbage_model_is_load_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not protobuf").unwrap();
        let result = OnnxClassifier::load(file.path(), None, OutputKind::Margins);
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }

    #[test]
    fn test_importance_sidecar() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[1.0, 1.0, 2.0]").unwrap();

        assert_eq!(read_importance(file.path(), 3).unwrap(), vec![0.25, 0.25, 0.5]);
        assert!(matches!(
            read_importance(file.path(), 4),
            Err(InferenceError::ArtifactMismatch(_))
        ));
    }

    #[test]
    fn test_softprob_graph_finds_probability_output() {
        let model = OnnxClassifier::load(
            fixture("softprob_dynamic_batch.onnx"),
            None,
            OutputKind::Probabilities,
        )
        .unwrap();

        // slot 0 is the int64 label, the f32 matrix comes second
        assert_eq!(model.output_slot, 1);
        assert_eq!(model.num_features(), 3);
        assert_eq!(model.num_classes(), 4);
        assert_eq!(model.feature_importance(), vec![0.0; 3]);
    }

    #[test]
    fn test_batched_run_matches_row_by_row() {
        let model = OnnxClassifier::load(
            fixture("softprob_dynamic_batch.onnx"),
            None,
            OutputKind::Probabilities,
        )
        .unwrap();

        let rows: Vec<&[f64]> = ROWS.iter().map(|r| r.as_slice()).collect();
        let batched = model.predict_proba(&rows).unwrap();
        assert_eq!(batched.len(), ROWS.len());

        for (row, probs) in rows.iter().zip(&batched) {
            let single = model.predict_proba(std::slice::from_ref(row)).unwrap();
            assert_close(probs, &single[0]);
            assert_close(probs, &softmax(&logits(row)));
        }

        let classes: Vec<Option<usize>> = batched.iter().map(|p| argmax(p)).collect();
        assert_eq!(classes, vec![Some(2), Some(0), Some(3), Some(1)]);
    }

    #[test]
    fn test_fixed_batch_graph_scores_every_row_in_order() {
        let model = OnnxClassifier::load(
            fixture("margins_batch_one.onnx"),
            None,
            OutputKind::Margins,
        )
        .unwrap();
        assert_eq!(model.num_classes(), 4);

        let rows: Vec<&[f64]> = ROWS.iter().map(|r| r.as_slice()).collect();
        let probs = model.predict_proba(&rows).unwrap();

        assert_eq!(probs.len(), ROWS.len());
        for (row, p) in rows.iter().zip(&probs) {
            assert_close(p, &softmax(&logits(row)));
        }
    }

    #[test]
    fn test_margins_read_as_probabilities_is_rejected() {
        let model = OnnxClassifier::load(
            fixture("margins_batch_one.onnx"),
            None,
            OutputKind::Probabilities,
        )
        .unwrap();

        let row = [1.0, 0.0, 0.0];
        let result = model.predict_proba(&[row.as_slice()]);
        assert!(matches!(result, Err(InferenceError::InferenceFailed(_))));
    }

    #[test]
    fn test_wrong_row_width_rejected() {
        let model = OnnxClassifier::load(
            fixture("softprob_dynamic_batch.onnx"),
            None,
            OutputKind::Probabilities,
        )
        .unwrap();

        let row = [1.0, 0.0];
        let result = model.predict_proba(&[row.as_slice()]);
        assert!(matches!(result, Err(InferenceError::InvalidInputShape { .. })));
    }
}

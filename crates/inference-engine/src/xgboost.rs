//! XGBoost JSON Tree Ensembles
//!
//! Evaluates gradient-boosted trees saved with XGBoost's JSON `save_model`
//! format. Only numerical splits from the `gbtree` booster are supported.

use crate::classifier::{normalise, softmax, Classifier};
use crate::InferenceError;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ModelDocument {
    learner: LearnerDocument,
}

#[derive(Debug, Deserialize)]
struct LearnerDocument {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDocument,
    learner_model_param: LearnerParams,
    objective: ObjectiveDocument,
}

#[derive(Debug, Deserialize)]
struct BoosterDocument {
    name: String,
    model: Option<GbTreeDocument>,
}

#[derive(Debug, Deserialize)]
struct GbTreeDocument {
    tree_info: Vec<usize>,
    trees: Vec<TreeDocument>,
}

#[derive(Debug, Deserialize)]
struct LearnerParams {
    base_score: String,
    num_class: String,
    num_feature: String,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDocument {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeDocument {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i64>,
    #[serde(default)]
    loss_changes: Vec<f64>,
}

/// Older exports write booleans, newer ones write 0/1
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
    class: usize,
}

impl Tree {
    fn from_document(
        doc: &TreeDocument,
        class: usize,
        num_features: usize,
        tree_idx: usize,
    ) -> Result<Self, InferenceError> {
        let n = doc.left_children.len();
        let fail = |reason: String| load_error(format!("tree {}: {}", tree_idx, reason));

        if n == 0 {
            return Err(fail("no nodes".to_string()));
        }
        if [
            doc.right_children.len(),
            doc.split_indices.len(),
            doc.split_conditions.len(),
            doc.default_left.len(),
        ]
        .iter()
        .any(|len| *len != n)
        {
            return Err(fail("node arrays differ in length".to_string()));
        }
        if doc.split_type.iter().any(|t| *t != 0) {
            return Err(fail("categorical splits are not supported".to_string()));
        }

        let mut nodes = Vec::with_capacity(n);
        for idx in 0..n {
            let left = doc.left_children[idx];
            if left == -1 {
                nodes.push(Node::Leaf(doc.split_conditions[idx]));
                continue;
            }

            let right = doc.right_children[idx];
            let child = |c: i64| -> Result<usize, InferenceError> {
                // Children always follow their parent, which rules out cycles
                usize::try_from(c)
                    .ok()
                    .filter(|c| *c > idx && *c < n)
                    .ok_or_else(|| fail(format!("node {} has invalid child {}", idx, c)))
            };
            let feature = usize::try_from(doc.split_indices[idx])
                .ok()
                .filter(|f| *f < num_features)
                .ok_or_else(|| {
                    fail(format!(
                        "node {} splits on feature {} of {}",
                        idx, doc.split_indices[idx], num_features
                    ))
                })?;

            nodes.push(Node::Split {
                feature,
                threshold: doc.split_conditions[idx] as f32,
                left: child(left)?,
                right: child(right)?,
                default_left: doc.default_left[idx].is_set(),
            });
        }

        Ok(Self { nodes, class })
    }

    fn leaf_value(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row[feature] as f32;
                    idx = if x.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Multi-class gradient-boosted tree ensemble
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    trees: Vec<Tree>,
    num_classes: usize,
    num_features: usize,
    base_score: f64,
    feature_names: Vec<String>,
    importance: Vec<f64>,
}

impl TreeEnsemble {
    /// Load a model saved with `save_model("model.json")`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| load_error(format!("cannot read {}: {}", path.display(), e)))?;

        let ensemble = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            trees = ensemble.trees.len(),
            classes = ensemble.num_classes,
            features = ensemble.num_features,
            "XGBoost model loaded"
        );
        Ok(ensemble)
    }

    pub fn from_json(json: &str) -> Result<Self, InferenceError> {
        let doc: ModelDocument =
            serde_json::from_str(json).map_err(|e| load_error(format!("model document: {}", e)))?;
        let learner = doc.learner;

        if !learner.objective.name.starts_with("multi:") {
            return Err(load_error(format!(
                "objective {} is not a multi-class objective",
                learner.objective.name
            )));
        }
        if learner.gradient_booster.name != "gbtree" {
            return Err(load_error(format!(
                "booster {} is not supported",
                learner.gradient_booster.name
            )));
        }
        let booster = learner
            .gradient_booster
            .model
            .ok_or_else(|| load_error("booster has no model section".to_string()))?;

        let num_classes = parse_param(&learner.learner_model_param.num_class, "num_class")? as usize;
        let num_features =
            parse_param(&learner.learner_model_param.num_feature, "num_feature")? as usize;
        let base_score = parse_param(&learner.learner_model_param.base_score, "base_score")?;

        if num_classes < 2 {
            return Err(load_error(format!("num_class {} is below 2", num_classes)));
        }
        if booster.tree_info.len() != booster.trees.len() {
            return Err(load_error("tree_info does not match tree count".to_string()));
        }
        if !learner.feature_names.is_empty() && learner.feature_names.len() != num_features {
            return Err(load_error(format!(
                "model lists {} feature names for {} features",
                learner.feature_names.len(),
                num_features
            )));
        }

        let mut trees = Vec::with_capacity(booster.trees.len());
        let mut gain = vec![0.0; num_features];
        let mut splits = vec![0usize; num_features];

        for (idx, (doc, class)) in booster.trees.iter().zip(&booster.tree_info).enumerate() {
            if *class >= num_classes {
                return Err(load_error(format!("tree {} targets class {}", idx, class)));
            }
            let tree = Tree::from_document(doc, *class, num_features, idx)?;

            for (node_idx, node) in tree.nodes.iter().enumerate() {
                if let Node::Split { feature, .. } = node {
                    gain[*feature] += doc.loss_changes.get(node_idx).copied().unwrap_or(0.0);
                    splits[*feature] += 1;
                }
            }
            trees.push(tree);
        }

        // Average gain per split, the exporting library's default importance
        let average_gain = gain
            .into_iter()
            .zip(splits)
            .map(|(g, n)| if n == 0 { 0.0 } else { g / n as f64 })
            .collect();

        Ok(Self {
            trees,
            num_classes,
            num_features,
            base_score,
            feature_names: learner.feature_names,
            importance: normalise(average_gain),
        })
    }

    /// Raw per-class margins for one row
    pub fn margins(&self, row: &[f64]) -> Vec<f64> {
        let mut margins = vec![self.base_score; self.num_classes];
        for tree in &self.trees {
            margins[tree.class] += tree.leaf_value(row);
        }
        margins
    }
}

impl Classifier for TreeEnsemble {
    fn kind(&self) -> &'static str {
        "xgboost_json"
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn feature_names(&self) -> Option<&[String]> {
        if self.feature_names.is_empty() {
            None
        } else {
            Some(&self.feature_names)
        }
    }

    fn predict_proba(&self, rows: &[&[f64]]) -> Result<Vec<Vec<f64>>, InferenceError> {
        rows.iter()
            .map(|row| {
                if row.len() != self.num_features {
                    return Err(InferenceError::InvalidInputShape {
                        expected: format!("[_, {}]", self.num_features),
                        actual: format!("[_, {}]", row.len()),
                    });
                }
                Ok(softmax(&self.margins(row)))
            })
            .collect()
    }

    fn feature_importance(&self) -> Vec<f64> {
        self.importance.clone()
    }
}

/// Parse an XGBoost scalar parameter; newer releases wrap it in brackets
fn parse_param(raw: &str, name: &str) -> Result<f64, InferenceError> {
    raw.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| load_error(format!("cannot parse {} from {:?}", name, raw)))
}

fn load_error(reason: String) -> InferenceError {
    InferenceError::ModelLoadError(reason)
}

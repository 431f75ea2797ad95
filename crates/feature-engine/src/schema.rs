//! Feature Schema
//!
//! The training-time contract: which columns the classifier reads, in which
//! order, how categorical source fields expand into those columns, and which
//! class labels the output axis carries. Loaded once, never mutated.

use crate::error::FeatureError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Schema document version understood by this build
pub const SCHEMA_VERSION: u32 = 1;

/// Encoding applied to a categorical source field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingRule {
    /// Value → integer code, emitted under the field's own name
    Ordinal { mapping: BTreeMap<String, i64> },
    /// Value → `{field}_{value}` indicator columns
    OneHot {
        categories: Vec<String>,
        /// Alternate spellings mapped onto a category
        #[serde(default)]
        aliases: BTreeMap<String, String>,
    },
}

impl EncodingRule {
    /// Every column this rule can emit for `field`
    pub fn output_columns(&self, field: &str) -> Vec<String> {
        match self {
            EncodingRule::Ordinal { .. } => vec![field.to_string()],
            EncodingRule::OneHot { categories, .. } => categories
                .iter()
                .map(|category| one_hot_column(field, category))
                .collect(),
        }
    }
}

/// Indicator column name for a one-hot category
pub fn one_hot_column(field: &str, category: &str) -> String {
    format!("{}_{}", field, category)
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default = "default_version")]
    version: u32,
    feature_names: Vec<String>,
    categorical_rules: BTreeMap<String, EncodingRule>,
    #[serde(default)]
    identifier_column: Option<String>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

/// Immutable feature contract shared by every request
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    feature_names: Vec<String>,
    positions: HashMap<String, usize>,
    rules: BTreeMap<String, EncodingRule>,
    class_labels: Vec<String>,
    identifier_column: Option<String>,
}

impl FeatureSchema {
    /// Build and validate a schema
    pub fn new(
        feature_names: Vec<String>,
        rules: BTreeMap<String, EncodingRule>,
        class_labels: Vec<String>,
    ) -> Result<Self, FeatureError> {
        if feature_names.is_empty() {
            return Err(invalid("feature name list is empty"));
        }

        let mut positions = HashMap::with_capacity(feature_names.len());
        for (idx, name) in feature_names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(invalid(format!("feature name at position {} is blank", idx)));
            }
            if positions.insert(name.clone(), idx).is_some() {
                return Err(invalid(format!("duplicate feature name {}", name)));
            }
        }

        for (field, rule) in &rules {
            if let EncodingRule::OneHot { categories, aliases } = rule {
                if categories.is_empty() {
                    return Err(invalid(format!("one-hot rule for {} has no categories", field)));
                }
                let unique: HashSet<&String> = categories.iter().collect();
                if unique.len() != categories.len() {
                    return Err(invalid(format!("one-hot rule for {} repeats a category", field)));
                }
                if let Some((alias, target)) = aliases.iter().find(|(_, t)| !unique.contains(t)) {
                    return Err(invalid(format!(
                        "alias {} of {} points at unknown category {}",
                        alias, field, target
                    )));
                }
            }
            if let EncodingRule::Ordinal { mapping } = rule {
                if mapping.is_empty() {
                    return Err(invalid(format!("ordinal rule for {} has no mapping", field)));
                }
            }
            if let Some(column) = rule
                .output_columns(field)
                .into_iter()
                .find(|column| !positions.contains_key(column))
            {
                return Err(invalid(format!(
                    "rule for {} emits {} which is not a schema feature",
                    field, column
                )));
            }
        }

        if class_labels.is_empty() {
            return Err(invalid("class label list is empty"));
        }
        let unique_labels: HashSet<&String> = class_labels.iter().collect();
        if unique_labels.len() != class_labels.len() {
            return Err(invalid("class label list contains duplicates"));
        }

        Ok(Self {
            feature_names,
            positions,
            rules,
            class_labels,
            identifier_column: None,
        })
    }

    /// Name the column that carries row identifiers; it never becomes a feature
    pub fn with_identifier_column(mut self, column: impl Into<String>) -> Result<Self, FeatureError> {
        let column = column.into();
        if self.positions.contains_key(&column) {
            return Err(invalid(format!("identifier column {} is also a feature", column)));
        }
        self.identifier_column = Some(column);
        Ok(self)
    }

    /// Load the schema document and the class-label list from disk
    pub fn load(
        schema_path: impl AsRef<Path>,
        labels_path: impl AsRef<Path>,
    ) -> Result<Self, FeatureError> {
        let schema_path = schema_path.as_ref();
        let labels_path = labels_path.as_ref();

        let schema_json = std::fs::read_to_string(schema_path).map_err(|e| {
            FeatureError::SchemaLoad(format!("cannot read {}: {}", schema_path.display(), e))
        })?;
        let labels_json = std::fs::read_to_string(labels_path).map_err(|e| {
            FeatureError::SchemaLoad(format!("cannot read {}: {}", labels_path.display(), e))
        })?;

        let schema = Self::from_json(&schema_json, &labels_json)?;
        info!(
            schema = %schema_path.display(),
            labels = %labels_path.display(),
            features = schema.feature_count(),
            classes = schema.class_labels.len(),
            categorical_fields = schema.rules.len(),
            "Feature schema loaded"
        );
        Ok(schema)
    }

    /// Parse the schema document and label list from JSON text
    pub fn from_json(schema_json: &str, labels_json: &str) -> Result<Self, FeatureError> {
        let document: SchemaDocument = serde_json::from_str(schema_json)
            .map_err(|e| invalid(format!("schema document: {}", e)))?;

        if document.version != SCHEMA_VERSION {
            return Err(invalid(format!(
                "schema version {} is not supported (expected {})",
                document.version, SCHEMA_VERSION
            )));
        }

        let class_labels: Vec<String> = serde_json::from_str(labels_json)
            .map_err(|e| invalid(format!("class labels: {}", e)))?;

        let schema = Self::new(document.feature_names, document.categorical_rules, class_labels)?;
        match document.identifier_column {
            Some(column) => schema.with_identifier_column(column),
            None => Ok(schema),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn contains_feature(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Position of a feature in the aligned vector
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_labels(&self) -> &[String] {
        &self.class_labels
    }

    pub fn categorical_rules(&self) -> &BTreeMap<String, EncodingRule> {
        &self.rules
    }

    pub fn is_categorical(&self, field: &str) -> bool {
        self.rules.contains_key(field)
    }

    pub fn identifier_column(&self) -> Option<&str> {
        self.identifier_column.as_deref()
    }
}

fn invalid(reason: impl Into<String>) -> FeatureError {
    FeatureError::SchemaLoad(reason.into())
}

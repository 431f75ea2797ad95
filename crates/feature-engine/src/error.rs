//! Feature Engineering Error Types

use thiserror::Error;

/// Errors raised while loading the schema or preparing features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// Schema or label artifact absent, unparseable or inconsistent
    #[error("Schema load failed: {0}")]
    SchemaLoad(String),

    /// Categorical value outside the trained rule set.
    ///
    /// Recovered where it is raised: the field is treated as absent.
    #[error("Unknown category {value:?} for field {field}")]
    UnknownCategory { field: String, value: String },

    /// Upload contained no rows
    #[error("Empty dataset: no rows to score")]
    EmptyDataset,
}

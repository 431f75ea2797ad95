//! Upload Error Types

use thiserror::Error;

/// Errors while reading an uploaded table
#[derive(Debug, Clone, Error)]
pub enum InputError {
    /// File type we do not read
    #[error("Unsupported upload format: {0}")]
    UnsupportedFormat(String),

    /// File could not be parsed as the detected format
    #[error("Malformed {format} upload: {reason}")]
    Malformed {
        format: &'static str,
        reason: String,
    },

    /// Two columns share a header name
    #[error("Duplicate column header: {0}")]
    DuplicateColumn(String),

    /// Upload exceeds the configured row limit
    #[error("Upload has {rows} rows, limit is {limit}")]
    TooManyRows { rows: usize, limit: usize },
}

//! Feature Engineering Engine
//!
//! Turns untrusted upload rows into the exact feature vectors the risk
//! classifier was trained on: categorical encoding, derived tradeline
//! features and alignment against the training schema.

mod aligner;
mod derived;
mod encoded;
mod encoder;
mod error;
mod pipeline;
mod schema;

pub use aligner::{AlignedFeatureVector, AlignmentReport, SchemaAligner};
pub use derived::{DerivedFeature, DerivedFeatureComputer, Formula, STANDARD_FEATURES};
pub use encoded::EncodedRecord;
pub use encoder::{CategoricalEncoder, Encoding};
pub use error::FeatureError;
pub use pipeline::{FeaturePipeline, PreparedBatch};
pub use schema::{one_hot_column, EncodingRule, FeatureSchema, SCHEMA_VERSION};

//! Risk Result Enrichment
//!
//! Tier descriptors, presentation values, credit factors and batch summaries
//! for scored applicants.

mod enricher;
mod factors;
mod tier;

pub use enricher::{BatchSummary, EnrichedResult, EnricherConfig, ResultEnricher};
pub use factors::{bucket_importance, default_factor_groups, CreditFactor, FactorGroup, RankedImportance};
pub use tier::RiskTier;

use thiserror::Error;

/// Errors while enriching predictions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichError {
    /// Predicted label is not one of the four tiers
    #[error("Unknown risk tier label: {0}")]
    UnknownRiskTier(String),

    /// Batch inputs that are paired by position differ in length
    #[error("Batch has {ids} customer ids for {predictions} predictions")]
    BatchLengthMismatch { ids: usize, predictions: usize },
}

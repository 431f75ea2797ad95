//! Result Enrichment
//!
//! Maps predictions onto tier descriptors. Credit score and success rate are
//! presentation values drawn from the tier's band; they carry no model signal.
//! The random source is supplied by the caller so tests can seed it.

use crate::factors::{bucket_importance, default_factor_groups, CreditFactor, FactorGroup, RankedImportance};
use crate::tier::RiskTier;
use crate::EnrichError;
use inference_engine::PredictionResult;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnricherConfig {
    /// Seed for the presentation values; unseeded draws differ per call
    pub cosmetic_seed: Option<u64>,
    /// Factor grouping of schema features
    pub credit_factors: Vec<FactorGroup>,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            cosmetic_seed: None,
            credit_factors: default_factor_groups(),
        }
    }
}

/// One scored row as returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedResult {
    pub customer_id: String,
    pub risk_level: RiskTier,
    pub risk_description: String,
    pub category: String,
    pub credit_score: u32,
    pub success_rate: u32,
    pub is_eligible: bool,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
    pub recommendations: Vec<String>,
}

/// Aggregate view of a scored batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    /// Most frequent tier; ties go to the better tier
    pub dominant_tier: RiskTier,
    pub average_credit_score: f64,
    pub eligible_count: usize,
    pub tier_counts: BTreeMap<RiskTier, usize>,
}

/// Turns predictions into client-facing results
#[derive(Debug, Clone)]
pub struct ResultEnricher {
    config: EnricherConfig,
}

impl ResultEnricher {
    pub fn new(config: EnricherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnricherConfig {
        &self.config
    }

    /// Enrich one prediction
    pub fn enrich<R: Rng + ?Sized>(
        &self,
        customer_id: impl Into<String>,
        prediction: &PredictionResult,
        rng: &mut R,
    ) -> Result<EnrichedResult, EnrichError> {
        let tier = RiskTier::parse(&prediction.predicted_class)?;

        Ok(EnrichedResult {
            customer_id: customer_id.into(),
            risk_level: tier,
            risk_description: tier.description().to_string(),
            category: tier.category().to_string(),
            credit_score: rng.gen_range(tier.credit_score_band()),
            success_rate: rng.gen_range(tier.success_rate_band()),
            is_eligible: tier.is_eligible(),
            confidence: prediction.confidence,
            probabilities: prediction.probabilities.clone(),
            recommendations: tier.recommendations().into_iter().map(String::from).collect(),
        })
    }

    /// Enrich a batch; `customer_ids` and `predictions` are paired by position
    pub fn enrich_batch<R: Rng + ?Sized>(
        &self,
        customer_ids: &[String],
        predictions: &[PredictionResult],
        rng: &mut R,
    ) -> Result<Vec<EnrichedResult>, EnrichError> {
        if customer_ids.len() != predictions.len() {
            return Err(EnrichError::BatchLengthMismatch {
                ids: customer_ids.len(),
                predictions: predictions.len(),
            });
        }

        let results = customer_ids
            .iter()
            .zip(predictions)
            .map(|(id, prediction)| self.enrich(id.as_str(), prediction, rng))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Enriched {} predictions", results.len());
        Ok(results)
    }

    /// Group ranked importance into the configured credit factors
    pub fn credit_factors(&self, importance: &RankedImportance) -> Vec<CreditFactor> {
        bucket_importance(&self.config.credit_factors, importance)
    }

    /// Summarise a batch; `None` when there is nothing to summarise
    pub fn summarize(results: &[EnrichedResult]) -> Option<BatchSummary> {
        if results.is_empty() {
            return None;
        }

        let mut tier_counts: BTreeMap<RiskTier, usize> =
            RiskTier::ALL.iter().map(|tier| (*tier, 0)).collect();
        for result in results {
            *tier_counts.entry(result.risk_level).or_insert(0) += 1;
        }

        // Iteration runs best tier first, so a strict comparison keeps the better one on ties
        let mut dominant_tier = RiskTier::P1;
        let mut dominant_count = 0;
        for (tier, count) in &tier_counts {
            if *count > dominant_count {
                dominant_tier = *tier;
                dominant_count = *count;
            }
        }

        let total_score: u64 = results.iter().map(|r| u64::from(r.credit_score)).sum();

        Some(BatchSummary {
            total: results.len(),
            dominant_tier,
            average_credit_score: total_score as f64 / results.len() as f64,
            eligible_count: results.iter().filter(|r| r.is_eligible).count(),
            tier_counts,
        })
    }
}

impl Default for ResultEnricher {
    fn default() -> Self {
        Self::new(EnricherConfig::default())
    }
}

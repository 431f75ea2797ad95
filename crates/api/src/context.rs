//! Scoring Context
//!
//! Everything a request needs to score an upload, built once from the model
//! artifacts and shared read-only. Reloading means building a new context and
//! swapping it into the application state.

use crate::config::ArtifactConfig;
use crate::error::ApiError;
use crate::telemetry;
use chrono::{DateTime, Utc};
use feature_engine::{AlignmentReport, FeaturePipeline, FeatureSchema};
use inference_engine::{load_classifier, Classifier, InferenceEngine, InferenceError, ModelFormat};
use rand::rngs::StdRng;
use rand::SeedableRng;
use risk_enricher::{
    BatchSummary, CreditFactor, EnrichedResult, EnricherConfig, RankedImportance, ResultEnricher,
    RiskTier,
};
use serde::Serialize;
use std::sync::Arc;
use tabular_input::{parse_upload, RawRecord, ReaderConfig};
use tracing::info;
use uuid::Uuid;

/// Response for the scoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ScoringResponse {
    pub batch_id: Uuid,
    pub total_rows: usize,
    /// One entry per uploaded row, in upload order
    pub results: Vec<EnrichedResult>,
    /// Predicted tier label per row
    pub predictions: Vec<String>,
    /// Row identifiers, parallel to `predictions`
    pub customer_ids: Vec<String>,
    pub feature_importance: RankedImportance,
    pub credit_factors: Vec<CreditFactor>,
    pub summary: Option<BatchSummary>,
    pub data_quality: AlignmentReport,
}

/// Loaded model state
pub struct ScoringContext {
    pipeline: FeaturePipeline,
    engine: InferenceEngine,
    enricher: ResultEnricher,
    importance: RankedImportance,
    credit_factors: Vec<CreditFactor>,
    reader: ReaderConfig,
    model_format: ModelFormat,
    loaded_at: DateTime<Utc>,
}

impl ScoringContext {
    /// Load schema, labels and classifier; fails if they disagree
    pub fn load(
        artifacts: &ArtifactConfig,
        enrichment: EnricherConfig,
        reader: ReaderConfig,
    ) -> Result<Self, ApiError> {
        info!(
            schema = %artifacts.schema_path.display(),
            labels = %artifacts.labels_path.display(),
            model = %artifacts.model_path.display(),
            format = artifacts.model_format.as_str(),
            "Loading model artifacts"
        );

        let schema = FeatureSchema::load(&artifacts.schema_path, &artifacts.labels_path)?;
        let classifier = load_classifier(
            artifacts.model_format,
            &artifacts.model_path,
            artifacts.importance_path.as_deref(),
            artifacts.onnx_output,
        )?;

        Self::from_parts(Arc::new(schema), classifier, artifacts.model_format, enrichment, reader)
    }

    /// Assemble a context from already loaded parts. Every class label must
    /// name a risk tier, so enrichment cannot fail on a loaded model.
    pub fn from_parts(
        schema: Arc<FeatureSchema>,
        classifier: Arc<dyn Classifier>,
        model_format: ModelFormat,
        enrichment: EnricherConfig,
        reader: ReaderConfig,
    ) -> Result<Self, ApiError> {
        for label in schema.class_labels() {
            RiskTier::parse(label).map_err(|_| {
                InferenceError::ArtifactMismatch(format!(
                    "class label {:?} is not a risk tier (expected one of P1, P2, P3, P4)",
                    label
                ))
            })?;
        }

        let engine = InferenceEngine::with_classifier(Arc::clone(&schema), classifier)?;
        let importance = RankedImportance::new(engine.feature_importance()?);
        let enricher = ResultEnricher::new(enrichment);
        let credit_factors = enricher.credit_factors(&importance);

        Ok(Self {
            pipeline: FeaturePipeline::new(schema),
            engine,
            enricher,
            importance,
            credit_factors,
            reader,
            model_format,
            loaded_at: Utc::now(),
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.pipeline.schema()
    }

    pub fn model_format(&self) -> ModelFormat {
        self.model_format
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn feature_importance(&self) -> &RankedImportance {
        &self.importance
    }

    pub fn credit_factors(&self) -> &[CreditFactor] {
        &self.credit_factors
    }

    /// Parse and score an uploaded file
    pub fn score_upload(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
        batch_id: Uuid,
    ) -> Result<ScoringResponse, ApiError> {
        let table = parse_upload(file_name, content_type, bytes, &self.reader)?;
        self.score_records(&table.records, batch_id)
    }

    /// Encode, align, predict and enrich a batch of rows
    pub fn score_records(
        &self,
        records: &[RawRecord],
        batch_id: Uuid,
    ) -> Result<ScoringResponse, ApiError> {
        let prepared = self.pipeline.prepare(records)?;
        let predictions = self.engine.predict(&prepared.vectors)?;

        let mut rng = match self.enricher.config().cosmetic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let results = self
            .enricher
            .enrich_batch(&prepared.row_ids, &predictions, &mut rng)?;
        let summary = ResultEnricher::summarize(&results);

        telemetry::record_batch(&prepared.report);
        if let Some(summary) = &summary {
            info!(
                rows = summary.total,
                dominant_tier = %summary.dominant_tier,
                eligible = summary.eligible_count,
                "Batch scored"
            );
        }

        Ok(ScoringResponse {
            batch_id,
            total_rows: results.len(),
            predictions: results.iter().map(|r| r.risk_level.to_string()).collect(),
            customer_ids: prepared.row_ids,
            results,
            feature_importance: self.importance.clone(),
            credit_factors: self.credit_factors.clone(),
            summary,
            data_quality: prepared.report,
        })
    }
}

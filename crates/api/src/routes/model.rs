//! Model Routes

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use inference_engine::InferenceError;
use risk_enricher::{CreditFactor, RankedImportance};
use serde::Serialize;

use crate::error::ApiError;
use crate::SharedState;

/// Summary of the loaded model and its schema
#[derive(Debug, Serialize)]
pub struct ModelResponse {
    pub format: &'static str,
    pub loaded_at: DateTime<Utc>,
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    pub class_labels: Vec<String>,
    pub categorical_fields: Vec<String>,
    pub identifier_column: Option<String>,
    pub feature_importance: RankedImportance,
    pub credit_factors: Vec<CreditFactor>,
}

/// Describe the loaded model
pub async fn get_model(State(state): State<SharedState>) -> Result<Json<ModelResponse>, ApiError> {
    let context = state
        .read()
        .await
        .context
        .clone()
        .ok_or(InferenceError::ModelNotLoaded)?;
    let schema = context.schema();

    Ok(Json(ModelResponse {
        format: context.model_format().as_str(),
        loaded_at: context.loaded_at(),
        feature_count: schema.feature_count(),
        feature_names: schema.feature_names().to_vec(),
        class_labels: schema.class_labels().to_vec(),
        categorical_fields: schema.categorical_rules().keys().cloned().collect(),
        identifier_column: schema.identifier_column().map(str::to_string),
        feature_importance: context.feature_importance().clone(),
        credit_factors: context.credit_factors().to_vec(),
    }))
}

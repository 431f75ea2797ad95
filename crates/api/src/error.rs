//! API Error Responses

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use feature_engine::FeatureError;
use inference_engine::InferenceError;
use risk_enricher::EnrichError;
use serde::Serialize;
use tabular_input::InputError;
use thiserror::Error;
use tracing::{error, warn};

/// Every failure a request can end in
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),

    /// Multipart body could not be read
    #[error("Invalid multipart body: {reason}")]
    Multipart { status: StatusCode, reason: String },

    /// Request carried no `file` part
    #[error("No file uploaded: expected a multipart field named \"file\"")]
    MissingFile,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Input(InputError::UnsupportedFormat(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Input(InputError::TooManyRows { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Input(_) => StatusCode::BAD_REQUEST,
            ApiError::Feature(FeatureError::SchemaLoad(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Feature(_) => StatusCode::BAD_REQUEST,
            ApiError::Inference(InferenceError::ModelNotLoaded) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Enrich(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Multipart { status, .. } => *status,
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Input(InputError::UnsupportedFormat(_)) => "unsupported_format",
            ApiError::Input(InputError::TooManyRows { .. }) => "too_many_rows",
            ApiError::Input(_) => "malformed_upload",
            ApiError::Feature(FeatureError::EmptyDataset) => "empty_dataset",
            ApiError::Feature(FeatureError::SchemaLoad(_)) => "schema_error",
            ApiError::Feature(FeatureError::UnknownCategory { .. }) => "unknown_category",
            ApiError::Inference(InferenceError::ModelNotLoaded) => "model_not_loaded",
            ApiError::Inference(InferenceError::ArtifactMismatch(_)) => "artifact_mismatch",
            ApiError::Inference(_) => "inference_failed",
            ApiError::Enrich(EnrichError::UnknownRiskTier(_)) => "unknown_risk_tier",
            ApiError::Enrich(EnrichError::BatchLengthMismatch { .. }) => "internal_error",
            ApiError::Multipart { .. } => "invalid_multipart",
            ApiError::MissingFile => "missing_file",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Multipart {
            status: err.status(),
            reason: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        } else {
            warn!(kind = self.kind(), "Request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.kind(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (FeatureError::EmptyDataset.into(), StatusCode::BAD_REQUEST),
            (
                InputError::UnsupportedFormat("xlsx".to_string()).into(),
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                InputError::TooManyRows { rows: 3, limit: 2 }.into(),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (InferenceError::ModelNotLoaded.into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                InferenceError::ArtifactMismatch("classes".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EnrichError::UnknownRiskTier("P9".to_string()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EnrichError::BatchLengthMismatch { ids: 1, predictions: 2 }.into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::MissingFile, StatusCode::BAD_REQUEST),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{}", err);
        }
    }

    #[test]
    fn test_error_body() {
        let response = ApiError::from(FeatureError::EmptyDataset).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(FeatureError::EmptyDataset).kind(), "empty_dataset");
    }
}

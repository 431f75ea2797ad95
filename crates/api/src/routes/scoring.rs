//! Scoring Routes

use axum::extract::{Multipart, State};
use axum::Json;
use inference_engine::InferenceError;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::context::ScoringResponse;
use crate::error::ApiError;
use crate::telemetry;
use crate::SharedState;

/// Multipart field carrying the upload
const FILE_FIELD: &str = "file";

struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Score every row of an uploaded CSV or JSON file
pub async fn process_file(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<ScoringResponse>, ApiError> {
    let batch_id = Uuid::new_v4();
    let span = info_span!("score_upload", %batch_id);

    async move {
        let start = Instant::now();
        let result = score(state, multipart, batch_id).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        telemetry::record_request(outcome, start.elapsed());
        info!(outcome, elapsed_ms = start.elapsed().as_millis() as u64, "Upload processed");

        result.map(Json)
    }
    .instrument(span)
    .await
}

async fn score(
    state: SharedState,
    multipart: Multipart,
    batch_id: Uuid,
) -> Result<ScoringResponse, ApiError> {
    let context = state
        .read()
        .await
        .context
        .clone()
        .ok_or(InferenceError::ModelNotLoaded)?;

    let upload = read_upload(multipart).await?;
    debug!(
        file_name = ?upload.file_name,
        content_type = ?upload.content_type,
        bytes = upload.bytes.len(),
        "Upload received"
    );

    // Scoring is CPU bound; keep it off the async workers
    let span = Span::current();
    tokio::task::spawn_blocking(move || {
        span.in_scope(|| {
            context.score_upload(
                upload.file_name.as_deref(),
                upload.content_type.as_deref(),
                &upload.bytes,
                batch_id,
            )
        })
    })
    .await
    .map_err(|e| ApiError::Internal(format!("scoring task failed: {}", e)))?
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(ApiError::MissingFile)
}

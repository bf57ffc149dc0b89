//! Bulk import API handlers
//!
//! POST /bulk-import, GET /import-jobs, GET /import-jobs/:job_id,
//! POST /import-jobs/:job_id/cancel

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::ImportJobView,
    AppState,
};

/// Multipart field carrying the spreadsheet
const FILE_FIELD: &str = "file";

/// POST /bulk-import response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Uuid,
}

/// POST /bulk-import
///
/// Parses the upload, registers the job and returns 202 with its id before
/// any row is processed.
pub async fn submit_import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("multipart field '{}' is required", FILE_FIELD))
    })?;

    tracing::info!(filename = %filename, bytes = bytes.len(), "Bulk import upload received");

    let job_id = state.coordinator.submit(bytes.to_vec(), &filename).await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { job_id })))
}

/// GET /import-jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<ImportJobView>> {
    Json(state.coordinator.list().await)
}

/// GET /import-jobs/:job_id
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<ImportJobView>> {
    state
        .coordinator
        .status(job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("import job not found: {}", job_id)))
}

/// POST /import-jobs/:job_id/cancel
///
/// 202: workers stop before their next row; poll until the job is terminal.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ImportJobView>)> {
    let view = state.coordinator.cancel(job_id).await?;
    Ok((StatusCode::ACCEPTED, Json(view)))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build bulk import routes
pub fn import_routes() -> Router<AppState> {
    Router::new()
        .route("/bulk-import", post(submit_import))
        .route("/import-jobs", get(list_jobs))
        .route("/import-jobs/:job_id", get(job_status))
        .route("/import-jobs/:job_id/cancel", post(cancel_job))
}

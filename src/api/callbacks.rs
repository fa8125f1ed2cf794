//! Worker-facing callback routes (spec.md §6.3 "Inbound"): workers invoke
//! these with `{job_id, task_id, result}` for job-chunk tasks or
//! `{image_id, result}` for validation tasks. Unauthenticated by design —
//! spec.md §1 places workers out of scope as "opaque tasks", and §4.7
//! only requires bearer auth on the end-user-facing routes; a production
//! deployment would instead put these behind the broker's own network
//! boundary (a Non-goal per spec.md §1: "defining a new task-queue wire
//! protocol").

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::domain::NewImage;
use crate::error::CoreError;
use crate::services::job_service::CompletionResult;
use crate::services::validation_service::ValidationResult;

/// One image record as reported by a download worker (spec.md §4.5
/// `handle_task_completion` result shape: "images: list of image
/// records").
#[derive(Debug, Deserialize)]
pub struct ImageRecord {
    pub source_url: String,
    pub storage_key: String,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub bytes: Option<i64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub perceptual_hash: Option<String>,
    #[serde(default)]
    pub labels: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl From<ImageRecord> for NewImage {
    fn from(r: ImageRecord) -> Self {
        Self {
            source_url: r.source_url,
            storage_key: r.storage_key,
            width: r.width,
            height: r.height,
            bytes: r.bytes,
            format: r.format,
            content_hash: r.content_hash,
            perceptual_hash: r.perceptual_hash,
            labels: r.labels,
            metadata: r.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskCompletionBody {
    pub success: bool,
    #[serde(default)]
    pub downloaded: u32,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

pub async fn handle_task_completion(
    State(state): State<AppState>,
    Path((job_id, task_id)): Path<(Uuid, String)>,
    Json(body): Json<TaskCompletionBody>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let result = CompletionResult {
        success: body.success,
        downloaded: body.downloaded,
        images: body.images.into_iter().map(Into::into).collect(),
        error: body.error,
    };

    state
        .job_service
        .handle_task_completion(job_id, &task_id, result)
        .await?;

    Ok(Json(serde_json::json!({ "accepted": true })))
}

#[derive(Debug, Deserialize)]
pub struct ValidationCompletionBody {
    pub is_valid: bool,
    #[serde(default)]
    pub is_duplicate: bool,
}

pub async fn handle_validation_result(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Json(body): Json<ValidationCompletionBody>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let result = ValidationResult {
        is_valid: body.is_valid,
        is_duplicate: body.is_duplicate,
    };

    state
        .validation_service
        .handle_validation_result(image_id, result)
        .await?;

    Ok(Json(serde_json::json!({ "accepted": true })))
}

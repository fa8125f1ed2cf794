//! `/validation/job/{id}` route (spec.md §6.1, §4.6).

use axum::extract::{Path, State};
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::CoreError;
use crate::services::validation_service::ValidationLevel;

#[derive(Debug, Deserialize)]
pub struct ValidateJobRequest {
    pub level: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateJobResponse {
    pub job_id: Uuid,
    pub images_count: usize,
    pub validation_level: String,
    pub task_ids: Vec<String>,
    pub message: String,
}

pub async fn validate_job_images(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
    Json(body): Json<ValidateJobRequest>,
) -> Result<Json<ValidateJobResponse>, CoreError> {
    let level: ValidationLevel = body.level.parse()?;

    let outcome = state
        .validation_service
        .validate_job_images(user_id, job_id, level)
        .await?;

    Ok(Json(ValidateJobResponse {
        job_id: outcome.job_id,
        images_count: outcome.images_count,
        validation_level: body.level,
        task_ids: outcome.task_ids,
        message: "validation dispatched".to_string(),
    }))
}

//! `/jobs` resource routes (spec.md §6.1), grounded in the teacher's
//! `deal_routes.rs` handler shape: `State` + `Extension<Uuid>` (the
//! identity resolved by `auth::require_identity`) + `Path`/`Json`
//! extractors, returning `Result<Json<Envelope<T>>, CoreError>` so the
//! centralized `IntoResponse` impl on `CoreError` does the status-code
//! mapping (spec.md §4.7 item (d)).

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::Extension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{AppState, CollectionEnvelope, DataEnvelope, PageMeta};
use crate::database::job_repository::{JobFilters, NewJobParams};
use crate::domain::{CrawlJob, JobStatus};
use crate::error::CoreError;

/// `POST /jobs` body (spec.md §6.1). `name` and `quality_filters` are
/// accepted for wire compatibility with spec.md's endpoint table but have
/// no counterpart in the `CrawlJob` data model of spec.md §3, so they are
/// parsed and discarded rather than silently rejected — see DESIGN.md.
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub project_id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub keywords: Vec<String>,
    pub max_images: u32,
    pub engines: Vec<String>,
    #[serde(default)]
    pub quality_filters: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub task_ids: Vec<String>,
    pub total_chunks: u32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub revoked_tasks: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u32,
    pub total_chunks: u32,
    pub active_chunks: u32,
    pub completed_chunks: u32,
    pub failed_chunks: u32,
    pub downloaded_images: u32,
    pub estimated_completion: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn create_job(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateJobRequest>,
) -> Result<Json<DataEnvelope<CrawlJob>>, CoreError> {
    if body.name.as_deref().is_some_and(str::is_empty) {
        return Err(CoreError::Validation("name must not be empty".into()));
    }

    let job = state
        .job_service
        .create_job(
            user_id,
            body.project_id,
            NewJobParams {
                keywords: body.keywords,
                engines: body.engines,
                max_images: body.max_images,
            },
        )
        .await?;

    Ok(Json(DataEnvelope::new(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DataEnvelope<CrawlJob>>, CoreError> {
    let job = state.job_service.get_job(user_id, job_id).await?;
    Ok(Json(DataEnvelope::new(job)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<CollectionEnvelope<CrawlJob>>, CoreError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(CoreError::Validation)?;

    let limit = if query.limit > 0 { query.limit } else { 50 };
    let filters = JobFilters {
        status,
        page: query.page,
        limit,
    };
    let jobs = state.job_service.list_jobs(user_id, filters).await?;

    // spec.md §6.1 collections envelope; `total` here is the page size
    // since `CrawlJobRepository::get_by_owner` does not separately expose
    // a count query (no endpoint in spec.md §6.1 requires exact totals
    // beyond pagination hints).
    let total = jobs.len() as i64;
    Ok(Json(CollectionEnvelope {
        data: jobs,
        meta: PageMeta::new(total, query.page, limit),
    }))
}

pub async fn start_job(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<StartResponse>, CoreError> {
    let outcome = state.job_service.start_job(user_id, job_id).await?;
    Ok(Json(StartResponse {
        job_id: outcome.job_id,
        status: outcome.status,
        task_ids: outcome.task_ids,
        total_chunks: outcome.total_chunks,
        message: "job started".to_string(),
    }))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, CoreError> {
    let outcome = state.job_service.cancel_job(user_id, job_id).await?;
    Ok(Json(CancelResponse {
        job_id: outcome.job_id,
        status: outcome.status,
        revoked_tasks: outcome.revoked_tasks,
        message: "job cancelled".to_string(),
    }))
}

pub async fn retry_job(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<StartResponse>, CoreError> {
    let outcome = state.job_service.retry_job(user_id, job_id).await?;
    Ok(Json(StartResponse {
        job_id: outcome.job_id,
        status: outcome.status,
        task_ids: outcome.task_ids,
        total_chunks: outcome.total_chunks,
        message: "job retried".to_string(),
    }))
}

pub async fn job_progress(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, CoreError> {
    let job = state.job_service.get_job(user_id, job_id).await?;
    Ok(Json(ProgressResponse {
        job_id: job.id,
        status: job.status,
        progress: job.progress,
        total_chunks: job.total_chunks,
        active_chunks: job.active_chunks,
        completed_chunks: job.completed_chunks,
        failed_chunks: job.failed_chunks,
        downloaded_images: job.downloaded_images,
        estimated_completion: None,
    }))
}

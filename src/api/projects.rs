//! `/projects` resource routes. Not named as an endpoint table in spec.md
//! §6.1 (which focuses on the job/validation surface), but spec.md §3
//! states projects are "created by handler" and deleted "only when no
//! active jobs reference it" — those two operations need a seam, so this
//! module provides the minimal CRUD spec.md's data model implies.

use axum::extract::{Path, State};
use axum::response::Json;
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{AppState, DataEnvelope};
use crate::database::project_repository::ProjectRepository;
use crate::domain::Project;
use crate::error::CoreError;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<DataEnvelope<Project>>, CoreError> {
    let project = ProjectRepository::create(&state.pool, user_id, &body.name).await?;
    Ok(Json(DataEnvelope::new(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<DataEnvelope<Project>>, CoreError> {
    let project = ProjectRepository::get(&state.pool, project_id).await?;
    if project.owner_user_id != user_id {
        return Err(CoreError::Forbidden(format!(
            "user {user_id} does not own project {project_id}"
        )));
    }
    Ok(Json(DataEnvelope::new(project)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<axum::http::StatusCode, CoreError> {
    let project = ProjectRepository::get(&state.pool, project_id).await?;
    if project.owner_user_id != user_id {
        return Err(CoreError::Forbidden(format!(
            "user {user_id} does not own project {project_id}"
        )));
    }
    ProjectRepository::delete(&state.pool, project_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

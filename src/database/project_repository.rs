//! Repository for `projects` (spec.md §4.2 ProjectRepository).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Project;
use crate::error::CoreError;

pub struct ProjectRepository;

impl ProjectRepository {
    pub async fn create(
        pool: &PgPool,
        owner_user_id: Uuid,
        name: &str,
    ) -> Result<Project, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::Validation("project name must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (id, user_id, name, created_at, updated_at)
            VALUES ($1, $2, $3, now(), now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_user_id)
        .bind(name)
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Project, CoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(r#"SELECT * FROM projects WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("project {id} not found")))?;
        Ok(row.into())
    }

    /// Confirms `user_id` owns `project_id`; used by handlers to enforce
    /// spec.md §6's ownership checks before a mutation proceeds.
    pub async fn get_owner(pool: &PgPool, project_id: Uuid) -> Result<Uuid, CoreError> {
        let row: (Uuid,) =
            sqlx::query_as(r#"SELECT user_id FROM projects WHERE id = $1"#)
                .bind(project_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| CoreError::NotFound(format!("project {project_id} not found")))?;
        Ok(row.0)
    }

    /// Refuses deletion while any non-terminal job exists under the
    /// project (spec.md §4.2: "delete — guarded against active jobs").
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), CoreError> {
        let (active_count,): (i64,) = sqlx::query_as(
            r#"
            SELECT count(*) FROM crawl_jobs
            WHERE project_id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        if active_count > 0 {
            return Err(CoreError::BadRequest(format!(
                "project {id} has {active_count} active job(s) and cannot be deleted"
            )));
        }

        let result = sqlx::query(r#"DELETE FROM projects WHERE id = $1"#)
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("project {id} not found")));
        }

        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            owner_user_id: row.user_id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

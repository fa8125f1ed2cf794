//! Repository for `crawl_jobs` (spec.md §4.2 CrawlJobRepository).
//!
//! Follows `ob-poc`'s `DealRepository` shape (unit struct, inherent async
//! fns over `&PgPool`, private `sqlx::FromRow` row type converted via
//! `From`) with one addition the teacher's read-only repositories don't
//! need: every mutation here is a guarded CAS or a single atomic UPDATE,
//! per spec.md §9 "State machine as guarded CAS".

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{CrawlJob, JobStatus};
use crate::error::CoreError;

/// Parameters accepted by `create` (spec.md §4.2: "create(project_id,
/// params) -> CrawlJob").
#[derive(Debug, Clone)]
pub struct NewJobParams {
    pub keywords: Vec<String>,
    pub engines: Vec<String>,
    pub max_images: u32,
}

/// Pagination + ownership filters for `get_by_owner`.
#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub status: Option<JobStatus>,
    pub page: i64,
    pub limit: i64,
}

/// Fields a guarded transition may set alongside the new status
/// (spec.md §4.2 `transition_status`).
#[derive(Debug, Clone, Default)]
pub struct TransitionFields {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub total_chunks: Option<u32>,
    pub active_chunks: Option<u32>,
    pub progress: Option<u32>,
}

/// Whether `mark_task_processed` observed a first-time or duplicate
/// callback (spec.md P9 result deduplication).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    FirstTime,
    Duplicate,
}

pub struct CrawlJobRepository;

impl CrawlJobRepository {
    pub async fn create(
        pool: &PgPool,
        project_id: Uuid,
        params: NewJobParams,
    ) -> Result<CrawlJob, CoreError> {
        if params.keywords.is_empty() {
            return Err(CoreError::Validation("keywords must not be empty".into()));
        }
        if params.engines.is_empty() {
            return Err(CoreError::Validation("engines must not be empty".into()));
        }
        if params.max_images == 0 {
            return Err(CoreError::Validation("max_images must be positive".into()));
        }

        let id = Uuid::new_v4();
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO crawl_jobs
                (id, project_id, keywords, engines, max_images, status,
                 total_chunks, active_chunks, completed_chunks, failed_chunks,
                 downloaded_images, valid_images, task_ids, processed_task_ids,
                 progress, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, 0, 0, 0, 0, 0, $6, $7, 0, now())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(project_id)
        .bind(Json(&params.keywords))
        .bind(Json(&params.engines))
        .bind(params.max_images as i32)
        .bind(Json(Vec::<String>::new()))
        .bind(Json(Vec::<String>::new()))
        .fetch_one(pool)
        .await?;

        Ok(row.into())
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<CrawlJob, CoreError> {
        let row = sqlx::query_as::<_, JobRow>(r#"SELECT * FROM crawl_jobs WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;
        Ok(row.into())
    }

    pub async fn get_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<CrawlJob, CoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"SELECT * FROM crawl_jobs WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;
        Ok(row.into())
    }

    pub async fn get_by_owner(
        pool: &PgPool,
        owner_user_id: Uuid,
        filters: JobFilters,
    ) -> Result<Vec<CrawlJob>, CoreError> {
        let limit = if filters.limit > 0 { filters.limit } else { 50 };
        let offset = filters.page.max(0) * limit;
        let status = filters.status.map(|s| s.as_db_str());

        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT j.* FROM crawl_jobs j
            JOIN projects p ON p.id = j.project_id
            WHERE p.user_id = $1
              AND ($2::text IS NULL OR j.status = $2)
            ORDER BY j.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner_user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Atomic against concurrent appends: `array_append` runs server-side
    /// under the row's implicit update lock, so two concurrent callers
    /// both land in the final array rather than racing a read-modify-write.
    pub async fn append_task_id(
        pool: &PgPool,
        id: Uuid,
        task_id: &str,
    ) -> Result<CrawlJob, CoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE crawl_jobs
            SET task_ids = task_ids || to_jsonb($2::text)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(task_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;

        Ok(row.into())
    }

    /// Re-reads and validates I1 within the same transaction the caller
    /// already holds (spec.md §4.2: "must execute within a single
    /// transaction and re-read the row").
    pub async fn update_counters(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        delta_completed: i64,
        delta_active: i64,
        delta_failed: i64,
        delta_downloaded: i64,
    ) -> Result<CrawlJob, CoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE crawl_jobs
            SET completed_chunks = completed_chunks + $2,
                active_chunks = active_chunks + $3,
                failed_chunks = failed_chunks + $4,
                downloaded_images = downloaded_images + $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(delta_completed)
        .bind(delta_active)
        .bind(delta_failed)
        .bind(delta_downloaded)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;

        let job: CrawlJob = row.into();
        if job.total_chunks > 0
            && job.completed_chunks + job.active_chunks + job.failed_chunks > job.total_chunks
        {
            return Err(CoreError::Infrastructure(format!(
                "counter invariant violated for job {id}: completed={} active={} failed={} total={}",
                job.completed_chunks, job.active_chunks, job.failed_chunks, job.total_chunks
            )));
        }

        Ok(job)
    }

    /// Guarded CAS: `UPDATE ... WHERE id = $1 AND status = ANY($2)`. Zero
    /// affected rows means the guard failed, surfaced as `BadRequest`
    /// (spec.md §9 "State machine as guarded CAS").
    #[allow(clippy::too_many_arguments)]
    pub async fn transition_status(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
        from: &[JobStatus],
        to: JobStatus,
        fields: TransitionFields,
    ) -> Result<CrawlJob, CoreError> {
        let from_strs: Vec<&str> = from.iter().map(|s| s.as_db_str()).collect();

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE crawl_jobs
            SET status = $3,
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                error = COALESCE($6, error),
                total_chunks = COALESCE($7, total_chunks),
                active_chunks = COALESCE($8, active_chunks),
                progress = COALESCE($9, progress)
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&from_strs)
        .bind(to.as_db_str())
        .bind(fields.started_at)
        .bind(fields.completed_at)
        .bind(fields.error)
        .bind(fields.total_chunks.map(|v| v as i32))
        .bind(fields.active_chunks.map(|v| v as i32))
        .bind(fields.progress.map(|v| v as i32))
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(CoreError::BadRequest(format!(
                "job {id} is not in one of the required states: {from_strs:?}"
            ))),
        }
    }

    /// Dedup guard for completion callbacks (spec.md I5, P9). Uses a
    /// conditional append so the check-and-insert is one round trip: the
    /// `WHERE NOT (processed_task_ids ? $2)` clause makes the statement a
    /// no-op update when the id is already present, and `affected rows`
    /// tells the caller which branch happened.
    pub async fn mark_task_processed(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        task_id: &str,
    ) -> Result<ProcessOutcome, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE crawl_jobs
            SET processed_task_ids = processed_task_ids || to_jsonb($2::text)
            WHERE id = $1 AND NOT (processed_task_ids @> to_jsonb($2::text))
            "#,
        )
        .bind(id)
        .bind(task_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            Ok(ProcessOutcome::FirstTime)
        } else {
            Ok(ProcessOutcome::Duplicate)
        }
    }

    /// Allowed only from `failed` or `cancelled` (spec.md §4.2
    /// reset_counters); enforced by the caller's prior status guard in
    /// `retry_job`, not re-checked here since this is a pure reset.
    pub async fn reset_counters(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
    ) -> Result<CrawlJob, CoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE crawl_jobs
            SET active_chunks = 0,
                completed_chunks = 0,
                failed_chunks = 0,
                downloaded_images = 0,
                processed_task_ids = '[]'::jsonb,
                task_ids = '[]'::jsonb,
                error = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;

        Ok(row.into())
    }

    pub async fn get_active_task_ids(pool: &PgPool, id: Uuid) -> Result<Vec<String>, CoreError> {
        let row = sqlx::query(r#"SELECT task_ids FROM crawl_jobs WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("crawl job {id} not found")))?;

        let Json(task_ids): Json<Vec<String>> = row.try_get("task_ids")?;
        Ok(task_ids)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    project_id: Uuid,
    keywords: Json<Vec<String>>,
    engines: Json<Vec<String>>,
    max_images: i32,
    total_chunks: i32,
    active_chunks: i32,
    completed_chunks: i32,
    failed_chunks: i32,
    downloaded_images: i32,
    valid_images: i32,
    task_ids: Json<Vec<String>>,
    processed_task_ids: Json<Vec<String>>,
    status: String,
    progress: i32,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for CrawlJob {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            keywords: row.keywords.0,
            engines: row.engines.0,
            max_images: row.max_images as u32,
            total_chunks: row.total_chunks as u32,
            active_chunks: row.active_chunks as u32,
            completed_chunks: row.completed_chunks as u32,
            failed_chunks: row.failed_chunks as u32,
            downloaded_images: row.downloaded_images as u32,
            valid_images: row.valid_images as u32,
            task_ids: row.task_ids.0,
            processed_task_ids: row.processed_task_ids.0,
            status: row.status.parse().unwrap_or(JobStatus::Failed),
            progress: row.progress as u32,
            error: row.error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_filters_default_uses_first_page() {
        let filters = JobFilters::default();
        assert_eq!(filters.page, 0);
        assert_eq!(filters.limit, 0);
    }
}

//! Repository for `job_chunks` (spec.md §4.2 JobChunkRepository), used
//! only under the `ImageRange` decomposition strategy (SPEC_FULL.md §9).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{ChunkStatus, JobChunk};
use crate::error::CoreError;

pub struct JobChunkRepository;

impl JobChunkRepository {
    /// Inserts the full set of ranges computed by
    /// `services::chunking::image_range_chunks`, all `pending`, priority
    /// defaulted to the chunk's position (earlier ranges dispatch first).
    pub async fn create_chunks(
        tx: &mut Transaction<'_, Postgres>,
        crawl_job_id: Uuid,
        ranges: &[(u32, u32)],
    ) -> Result<Vec<JobChunk>, CoreError> {
        let mut created = Vec::with_capacity(ranges.len());
        for (priority, &(start, end)) in ranges.iter().enumerate() {
            let id = Uuid::new_v4();
            let row = sqlx::query_as::<_, ChunkRow>(
                r#"
                INSERT INTO job_chunks
                    (id, crawl_job_id, image_range_start, image_range_end,
                     status, priority, retry_count, created_at)
                VALUES ($1, $2, $3, $4, 'pending', $5, 0, now())
                RETURNING *
                "#,
            )
            .bind(id)
            .bind(crawl_job_id)
            .bind(start as i32)
            .bind(end as i32)
            .bind(priority as i32)
            .fetch_one(&mut **tx)
            .await?;

            created.push(row.into());
        }
        Ok(created)
    }

    /// Claims the highest-priority pending chunk for dispatch, locking it
    /// `FOR UPDATE SKIP LOCKED` so concurrent dispatcher ticks never claim
    /// the same chunk twice (grounded in `database::locks`'s
    /// transaction-scoped row locking).
    pub async fn next_pending(
        tx: &mut Transaction<'_, Postgres>,
        crawl_job_id: Uuid,
    ) -> Result<Option<JobChunk>, CoreError> {
        let row = sqlx::query_as::<_, ChunkRow>(
            r#"
            SELECT * FROM job_chunks
            WHERE crawl_job_id = $1 AND status = 'pending'
            ORDER BY priority ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(crawl_job_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Guarded CAS identical in spirit to
    /// `CrawlJobRepository::transition_status`.
    pub async fn transition_chunk(
        executor: impl sqlx::PgExecutor<'_>,
        id: Uuid,
        from: &[ChunkStatus],
        to: ChunkStatus,
        task_id: Option<String>,
        error_message: Option<String>,
    ) -> Result<JobChunk, CoreError> {
        let from_strs: Vec<&str> = from.iter().map(|s| s.as_db_str()).collect();
        let now_started = matches!(to, ChunkStatus::Processing);
        let now_completed = matches!(to, ChunkStatus::Completed | ChunkStatus::Failed);

        let row = sqlx::query_as::<_, ChunkRow>(
            r#"
            UPDATE job_chunks
            SET status = $3,
                task_id = COALESCE($4, task_id),
                error_message = COALESCE($5, error_message),
                started_at = CASE WHEN $6 THEN now() ELSE started_at END,
                completed_at = CASE WHEN $7 THEN now() ELSE completed_at END,
                retry_count = CASE WHEN $3 = 'pending' THEN retry_count + 1 ELSE retry_count END
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&from_strs)
        .bind(to.as_db_str())
        .bind(task_id)
        .bind(error_message)
        .bind(now_started)
        .bind(now_completed)
        .fetch_optional(executor)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => Err(CoreError::BadRequest(format!(
                "chunk {id} is not in one of the required states: {from_strs:?}"
            ))),
        }
    }

    /// Counts by status, used by `JobService` to decide whether a job has
    /// finished all of its chunks (spec.md §4.5).
    pub async fn progress_for(
        pool: &PgPool,
        crawl_job_id: Uuid,
    ) -> Result<ChunkProgress, CoreError> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                count(*) FILTER (WHERE status = 'pending') AS pending,
                count(*) FILTER (WHERE status = 'processing') AS processing,
                count(*) FILTER (WHERE status = 'completed') AS completed,
                count(*) FILTER (WHERE status = 'failed') AS failed
            FROM job_chunks
            WHERE crawl_job_id = $1
            "#,
        )
        .bind(crawl_job_id)
        .fetch_one(pool)
        .await?;

        Ok(ChunkProgress {
            pending: row.0,
            processing: row.1,
            completed: row.2,
            failed: row.3,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl ChunkProgress {
    pub fn is_finished(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChunkRow {
    id: Uuid,
    crawl_job_id: Uuid,
    image_range_start: i32,
    image_range_end: i32,
    status: String,
    priority: i32,
    retry_count: i32,
    task_id: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ChunkRow> for JobChunk {
    fn from(row: ChunkRow) -> Self {
        Self {
            id: row.id,
            crawl_job_id: row.crawl_job_id,
            image_range_start: row.image_range_start as u32,
            image_range_end: row.image_range_end as u32,
            status: match row.status.as_str() {
                "pending" => ChunkStatus::Pending,
                "processing" => ChunkStatus::Processing,
                "completed" => ChunkStatus::Completed,
                _ => ChunkStatus::Failed,
            },
            priority: row.priority,
            retry_count: row.retry_count as u32,
            task_id: row.task_id,
            error_message: row.error_message,
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
    fn chunk_progress_is_finished_only_when_nothing_outstanding() {
        let finished = ChunkProgress {
            pending: 0,
            processing: 0,
            completed: 4,
            failed: 1,
        };
        assert!(finished.is_finished());

        let outstanding = ChunkProgress {
            pending: 1,
            processing: 0,
            completed: 4,
            failed: 0,
        };
        assert!(!outstanding.is_finished());
    }
}

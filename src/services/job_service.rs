//! The job lifecycle state machine (spec.md §4.5, L5), grounded in the
//! teacher's `database/cbu_service.rs`-style pattern of a service struct
//! wrapping `PgPool` alongside its collaborators, with business rules
//! living here rather than in the repository layer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::database::chunk_repository::JobChunkRepository;
use crate::database::image_repository::ImageRepository;
use crate::database::job_repository::{
    CrawlJobRepository, JobFilters, NewJobParams, ProcessOutcome, TransitionFields,
};
use crate::database::notification_repository::NotificationRepository;
use crate::database::project_repository::ProjectRepository;
use crate::dispatcher::{TaskBroker, TaskPayload};
use crate::domain::{CrawlJob, JobStatus, NewImage};
use crate::error::CoreError;
use crate::retry::operation_retry;
use crate::services::chunking::{self, ChunkPlan};

/// Per-image completion record carried in a worker callback (spec.md
/// §4.5 `handle_task_completion` result shape).
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub success: bool,
    pub downloaded: u32,
    pub images: Vec<NewImage>,
    pub error: Option<String>,
}

/// Outcome of `start_job`/`retry_job` (spec.md §6.1 response shape).
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub task_ids: Vec<String>,
    pub total_chunks: u32,
}

/// Outcome of `cancel_job`.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub revoked_tasks: usize,
}

/// Per-user token bucket guarding dispatch volume (spec.md §5 "Resource
/// caps": "a per-minute dispatch rate applied before step 6 of
/// start_job"). `governor`-free: a bounded `Semaphore` per user, refilled
/// lazily by a background permit return rather than a scheduled task,
/// matching the teacher's preference for `tokio::sync` primitives over a
/// dedicated rate-limiting crate.
pub struct DispatchRateLimiter {
    per_user: tokio::sync::Mutex<HashMap<Uuid, Arc<Semaphore>>>,
    permits_per_window: usize,
}

impl DispatchRateLimiter {
    pub fn new(permits_per_window: usize) -> Self {
        Self {
            per_user: tokio::sync::Mutex::new(HashMap::new()),
            permits_per_window,
        }
    }

    /// Acquires one permit for `user_id`'s current window, or
    /// `RateLimited` if none remain. Permits are not returned on a timer
    /// here; the caller (tests, or a future scheduled task) decides when
    /// to call `reset`.
    pub async fn try_acquire(&self, user_id: Uuid) -> Result<(), CoreError> {
        let mut guard = self.per_user.lock().await;
        let semaphore = guard
            .entry(user_id)
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits_per_window)));

        semaphore
            .clone()
            .try_acquire_owned()
            .map(|permit| permit.forget())
            .map_err(|_| CoreError::rate_limited(Some(std::time::Duration::from_secs(60))))
    }

    pub async fn reset(&self, user_id: Uuid) {
        let mut guard = self.per_user.lock().await;
        guard.insert(
            user_id,
            Arc::new(Semaphore::new(self.permits_per_window)),
        );
    }
}

pub struct JobService {
    pool: PgPool,
    broker: Arc<dyn TaskBroker>,
    config: ChunkingConfig,
    rate_limiter: Arc<DispatchRateLimiter>,
}

impl JobService {
    pub fn new(
        pool: PgPool,
        broker: Arc<dyn TaskBroker>,
        config: ChunkingConfig,
        rate_limiter: Arc<DispatchRateLimiter>,
    ) -> Self {
        Self {
            pool,
            broker,
            config,
            rate_limiter,
        }
    }

    async fn check_ownership(&self, job: &CrawlJob, user_id: Uuid) -> Result<(), CoreError> {
        let owner = ProjectRepository::get_owner(&self.pool, job.project_id).await?;
        if owner != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own job {}",
                job.id
            )));
        }
        Ok(())
    }

    pub async fn create_job(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        params: NewJobParams,
    ) -> Result<CrawlJob, CoreError> {
        let owner = ProjectRepository::get_owner(&self.pool, project_id).await?;
        if owner != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own project {project_id}"
            )));
        }
        CrawlJobRepository::create(&self.pool, project_id, params).await
    }

    pub async fn get_job(&self, user_id: Uuid, job_id: Uuid) -> Result<CrawlJob, CoreError> {
        let job = CrawlJobRepository::get(&self.pool, job_id).await?;
        self.check_ownership(&job, user_id).await?;
        Ok(job)
    }

    pub async fn list_jobs(
        &self,
        user_id: Uuid,
        filters: JobFilters,
    ) -> Result<Vec<CrawlJob>, CoreError> {
        CrawlJobRepository::get_by_owner(&self.pool, user_id, filters).await
    }

    /// spec.md §4.5 start_job steps 1–8.
    pub async fn start_job(&self, user_id: Uuid, job_id: Uuid) -> Result<StartOutcome, CoreError> {
        let job = CrawlJobRepository::get(&self.pool, job_id).await?;
        self.check_ownership(&job, user_id).await?;

        if job.status == JobStatus::Running {
            return Ok(StartOutcome {
                job_id: job.id,
                status: job.status,
                task_ids: job.task_ids,
                total_chunks: job.total_chunks,
            });
        }
        if job.status != JobStatus::Pending {
            return Err(CoreError::BadRequest(format!(
                "job {job_id} is {} and cannot be started",
                job.status
            )));
        }

        if job.keywords.is_empty() {
            return Err(CoreError::Validation("keywords must not be empty".into()));
        }
        if job.engines.is_empty() {
            return Err(CoreError::Validation("engines must not be empty".into()));
        }
        if job.max_images == 0 || job.max_images > self.config.max_images_cap {
            return Err(CoreError::Validation(format!(
                "max_images must be between 1 and {}",
                self.config.max_images_cap
            )));
        }

        self.rate_limiter.try_acquire(user_id).await?;

        let plans = chunking::decompose(
            self.config.strategy,
            job_id,
            &job.keywords,
            &job.engines,
            job.max_images,
        );
        if plans.len() as u32 > self.config.max_chunks_cap {
            return Err(CoreError::Validation(format!(
                "decomposition produced {} chunks, exceeding the cap of {}",
                plans.len(),
                self.config.max_chunks_cap
            )));
        }
        let total_chunks = plans.len() as u32;

        let job = CrawlJobRepository::transition_status(
            &self.pool,
            job_id,
            &[JobStatus::Pending],
            JobStatus::Running,
            TransitionFields {
                started_at: Some(Utc::now()),
                total_chunks: Some(total_chunks),
                active_chunks: Some(total_chunks),
                progress: Some(0),
                ..Default::default()
            },
        )
        .await?;

        let (_chunk_ids, task_ids) = self.dispatch_plans(job_id, &plans).await?;

        NotificationRepository::create(
            &self.pool,
            user_id,
            "job_started",
            serde_json::json!({ "job_id": job_id, "total_chunks": total_chunks }),
        )
        .await?;

        Ok(StartOutcome {
            job_id,
            status: job.status,
            task_ids,
            total_chunks,
        })
    }

    /// Enqueues every prepared chunk, persisting chunk rows under the
    /// range form. On any Permanent enqueue failure, aborts the
    /// remainder and CASes the job to `failed` before re-raising
    /// (spec.md §4.5 step 7).
    async fn dispatch_plans(
        &self,
        job_id: Uuid,
        plans: &[ChunkPlan],
    ) -> Result<(Vec<Uuid>, Vec<String>), CoreError> {
        let mut ranges = Vec::new();
        for plan in plans {
            if let Some(range) = plan.range {
                ranges.push(range);
            }
        }

        let chunk_ids = if !ranges.is_empty() {
            let mut tx = self.pool.begin().await.map_err(CoreError::from)?;
            let chunks = JobChunkRepository::create_chunks(&mut tx, job_id, &ranges).await?;
            tx.commit().await.map_err(CoreError::from)?;
            chunks.into_iter().map(|c| c.id).collect()
        } else {
            Vec::new()
        };

        let mut task_ids = Vec::with_capacity(plans.len());
        for plan in plans {
            let payload = plan.payload.clone();
            let kind = plan.kind;
            let broker = self.broker.clone();
            let enqueue_result =
                operation_retry(|| {
                    let broker = broker.clone();
                    let payload: TaskPayload = payload.clone();
                    async move { broker.enqueue(kind, payload).await }
                })
                .await;

            match enqueue_result {
                Ok(task_id) => {
                    CrawlJobRepository::append_task_id(&self.pool, job_id, &task_id).await?;
                    task_ids.push(task_id);
                }
                Err(err) => {
                    CrawlJobRepository::transition_status(
                        &self.pool,
                        job_id,
                        &[JobStatus::Running],
                        JobStatus::Failed,
                        TransitionFields {
                            completed_at: Some(Utc::now()),
                            error: Some(err.to_string()),
                            active_chunks: Some(0),
                            ..Default::default()
                        },
                    )
                    .await?;
                    return Err(err);
                }
            }
        }

        Ok((chunk_ids, task_ids))
    }

    /// spec.md §4.5 cancel_job.
    pub async fn cancel_job(&self, user_id: Uuid, job_id: Uuid) -> Result<CancelOutcome, CoreError> {
        let job = CrawlJobRepository::get(&self.pool, job_id).await?;
        self.check_ownership(&job, user_id).await?;

        if job.status == JobStatus::Cancelled {
            return Ok(CancelOutcome {
                job_id,
                status: job.status,
                revoked_tasks: 0,
            });
        }
        if job.status != JobStatus::Pending && job.status != JobStatus::Running {
            return Err(CoreError::BadRequest(format!(
                "job {job_id} is {} and cannot be cancelled",
                job.status
            )));
        }

        let active_task_ids = CrawlJobRepository::get_active_task_ids(&self.pool, job_id).await?;

        let job = CrawlJobRepository::transition_status(
            &self.pool,
            job_id,
            &[JobStatus::Pending, JobStatus::Running],
            JobStatus::Cancelled,
            TransitionFields {
                completed_at: Some(Utc::now()),
                active_chunks: Some(0),
                ..Default::default()
            },
        )
        .await?;

        let revoked = self.broker.revoke_many(&active_task_ids).await?;

        NotificationRepository::create(
            &self.pool,
            user_id,
            "job_cancelled",
            serde_json::json!({ "job_id": job_id }),
        )
        .await?;

        Ok(CancelOutcome {
            job_id,
            status: job.status,
            revoked_tasks: revoked,
        })
    }

    /// spec.md §4.5 handle_task_completion, steps 1–8 in one transaction.
    pub async fn handle_task_completion(
        &self,
        job_id: Uuid,
        task_id: &str,
        result: CompletionResult,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(CoreError::from)?;

        let job = CrawlJobRepository::get_for_update(&mut tx, job_id).await?;
        if job.status != JobStatus::Running && job.status != JobStatus::Cancelled {
            tx.commit().await.map_err(CoreError::from)?;
            return Ok(());
        }

        let outcome = CrawlJobRepository::mark_task_processed(&mut tx, job_id, task_id).await?;
        if outcome == ProcessOutcome::Duplicate {
            tx.commit().await.map_err(CoreError::from)?;
            return Ok(());
        }

        if job.status == JobStatus::Cancelled {
            tx.commit().await.map_err(CoreError::from)?;
            return Ok(());
        }

        let (delta_completed, delta_active, delta_failed, delta_downloaded) = if result.success {
            let image_count = result.images.len() as i64;
            ImageRepository::bulk_create(&mut tx, job_id, result.images.clone()).await?;
            (1i64, -1i64, 0i64, image_count)
        } else {
            (0i64, -1i64, 1i64, 0i64)
        };

        let job = CrawlJobRepository::update_counters(
            &mut tx,
            job_id,
            delta_completed,
            delta_active,
            delta_failed,
            delta_downloaded,
        )
        .await?;

        let progress = CrawlJob::compute_progress(job.completed_chunks, job.total_chunks);
        let reached_total = job.total_chunks > 0
            && job.completed_chunks + job.failed_chunks >= job.total_chunks;

        if reached_total {
            let failure_ratio = if job.total_chunks == 0 {
                0.0
            } else {
                job.failed_chunks as f64 / job.total_chunks as f64
            };

            let (to, error) = if job.failed_chunks == 0 || failure_ratio < self.config.failure_threshold
            {
                (JobStatus::Completed, None)
            } else {
                (
                    JobStatus::Failed,
                    Some(result.error.clone().unwrap_or_else(|| {
                        format!("{} of {} chunks failed", job.failed_chunks, job.total_chunks)
                    })),
                )
            };

            CrawlJobRepository::transition_status(
                &mut *tx,
                job_id,
                &[JobStatus::Running],
                to,
                TransitionFields {
                    completed_at: Some(Utc::now()),
                    error,
                    progress: Some(progress),
                    ..Default::default()
                },
            )
            .await?;

            let notification_type = if to == JobStatus::Completed {
                "job_completed"
            } else {
                "job_failed"
            };
            let owner = ProjectRepository::get_owner(&self.pool, job.project_id).await?;
            NotificationRepository::create(
                &mut *tx,
                owner,
                notification_type,
                serde_json::json!({ "job_id": job_id }),
            )
            .await?;
        } else {
            CrawlJobRepository::transition_status(
                &mut *tx,
                job_id,
                &[JobStatus::Running],
                JobStatus::Running,
                TransitionFields {
                    progress: Some(progress),
                    ..Default::default()
                },
            )
            .await?;
        }

        tx.commit().await.map_err(CoreError::from)?;
        Ok(())
    }

    /// spec.md §4.5 retry_job.
    pub async fn retry_job(&self, user_id: Uuid, job_id: Uuid) -> Result<StartOutcome, CoreError> {
        let job = CrawlJobRepository::get(&self.pool, job_id).await?;
        self.check_ownership(&job, user_id).await?;

        if job.status != JobStatus::Failed && job.status != JobStatus::Cancelled {
            return Err(CoreError::BadRequest(format!(
                "job {job_id} is {} and cannot be retried",
                job.status
            )));
        }

        CrawlJobRepository::reset_counters(&self.pool, job_id).await?;
        CrawlJobRepository::transition_status(
            &self.pool,
            job_id,
            &[JobStatus::Failed, JobStatus::Cancelled],
            JobStatus::Pending,
            TransitionFields::default(),
        )
        .await?;

        self.start_job(user_id, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_exhausts_after_window() {
        let limiter = DispatchRateLimiter::new(2);
        let user = Uuid::new_v4();
        limiter.try_acquire(user).await.unwrap();
        limiter.try_acquire(user).await.unwrap();
        assert!(limiter.try_acquire(user).await.is_err());
    }

    #[tokio::test]
    async fn rate_limiter_reset_refills_the_window() {
        let limiter = DispatchRateLimiter::new(1);
        let user = Uuid::new_v4();
        limiter.try_acquire(user).await.unwrap();
        assert!(limiter.try_acquire(user).await.is_err());
        limiter.reset(user).await;
        assert!(limiter.try_acquire(user).await.is_ok());
    }

    #[tokio::test]
    async fn rate_limiter_tracks_users_independently() {
        let limiter = DispatchRateLimiter::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        limiter.try_acquire(a).await.unwrap();
        assert!(limiter.try_acquire(b).await.is_ok());
    }
}

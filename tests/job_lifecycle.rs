//! Integration tests for the job lifecycle state machine (spec.md §8),
//! driving `JobService` against a real `PgPool` and an `InMemoryBroker`.
//! Grounded in the teacher's acknowledgment (in its `test_db_connection`
//! binary) that DB-backed tests need an environment most CI runs won't
//! have: every test here connects via `DATABASE_URL` and is `#[ignore]`d
//! by default, run explicitly against a disposable database.
//!
//! Pure-function properties (chunking cardinality, error classification,
//! retry backoff math) are covered unconditionally by the `#[cfg(test)]`
//! modules alongside the code they test and are not repeated here.

#![cfg(feature = "database")]

use std::sync::Arc;

use pixcrawler_orchestrator::config::ChunkingConfig;
use pixcrawler_orchestrator::database::job_repository::NewJobParams;
use pixcrawler_orchestrator::database::project_repository::ProjectRepository;
use pixcrawler_orchestrator::dispatcher::InMemoryBroker;
use pixcrawler_orchestrator::domain::JobStatus;
use pixcrawler_orchestrator::services::job_service::CompletionResult;
use pixcrawler_orchestrator::services::{DispatchRateLimiter, JobService};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run job_lifecycle integration tests");
    PgPool::connect(&url).await.expect("connect to test database")
}

fn service(pool: PgPool) -> (JobService, Arc<InMemoryBroker>) {
    let broker = InMemoryBroker::new();
    let service = JobService::new(
        pool,
        broker.clone(),
        ChunkingConfig::default(),
        Arc::new(DispatchRateLimiter::new(1000)),
    );
    (service, broker)
}

/// Scenario 1 (spec.md §8): happy keyword-engine job.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn happy_path_keyword_engine_job_completes() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "happy-path").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into(), "dog".into()],
                engines: vec!["google".into(), "bing".into()],
                max_images: 100,
            },
        )
        .await
        .unwrap();

    let start = service.start_job(user_id, job.id).await.unwrap();
    assert_eq!(start.total_chunks, 4);
    assert_eq!(start.task_ids.len(), 4);
    assert_eq!(start.status, JobStatus::Running);

    for task_id in &start.task_ids {
        service
            .handle_task_completion(
                job.id,
                task_id,
                CompletionResult {
                    success: true,
                    downloaded: 25,
                    images: (0..25)
                        .map(|i| pixcrawler_orchestrator::domain::NewImage {
                            source_url: format!("https://example.com/{i}"),
                            storage_key: format!("key-{i}"),
                            width: Some(100),
                            height: Some(100),
                            bytes: Some(1024),
                            format: Some("jpeg".into()),
                            content_hash: None,
                            perceptual_hash: None,
                            labels: serde_json::json!([]),
                            metadata: serde_json::json!({}),
                        })
                        .collect(),
                    error: None,
                },
            )
            .await
            .unwrap();
    }

    let finished = service.get_job(user_id, job.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.downloaded_images, 100);
}

/// Scenario 2 (spec.md §8): cancel mid-flight absorbs late callbacks.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn cancel_mid_flight_absorbs_late_completions() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "cancel-mid-flight").await.unwrap();
    let (service, broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into(), "dog".into()],
                engines: vec!["google".into(), "bing".into()],
                max_images: 100,
            },
        )
        .await
        .unwrap();

    let start = service.start_job(user_id, job.id).await.unwrap();

    service
        .handle_task_completion(
            job.id,
            &start.task_ids[0],
            CompletionResult {
                success: true,
                downloaded: 25,
                images: Vec::new(),
                error: None,
            },
        )
        .await
        .unwrap();

    let cancel = service.cancel_job(user_id, job.id).await.unwrap();
    assert_eq!(cancel.status, JobStatus::Cancelled);
    assert!(cancel.revoked_tasks <= 3);

    for task_id in &start.task_ids[1..] {
        service
            .handle_task_completion(
                job.id,
                task_id,
                CompletionResult {
                    success: true,
                    downloaded: 25,
                    images: Vec::new(),
                    error: None,
                },
            )
            .await
            .unwrap();
    }

    let after = service.get_job(user_id, job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Cancelled);
    assert_eq!(after.active_chunks, 0);
    assert_eq!(after.downloaded_images, 0, "late callbacks must not move counters");
    let _ = broker.enqueued_count().await;
}

/// Scenario 3 (spec.md §8): duplicate completion callback is a no-op (P9).
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_completion_callback_does_not_double_count() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "dedup").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into()],
                engines: vec!["google".into(), "bing".into()],
                max_images: 100,
            },
        )
        .await
        .unwrap();
    let start = service.start_job(user_id, job.id).await.unwrap();

    let completion = CompletionResult {
        success: true,
        downloaded: 25,
        images: Vec::new(),
        error: None,
    };
    service
        .handle_task_completion(job.id, &start.task_ids[0], completion.clone())
        .await
        .unwrap();
    service
        .handle_task_completion(job.id, &start.task_ids[0], completion)
        .await
        .unwrap();

    let job_after = service.get_job(user_id, job.id).await.unwrap();
    assert_eq!(job_after.completed_chunks, 1);
    assert_eq!(job_after.downloaded_images, 25);
}

/// P7: a second `start` on a running job is an idempotent short-circuit.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn second_start_on_running_job_is_idempotent() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "idempotent-start").await.unwrap();
    let (service, broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into()],
                engines: vec!["google".into()],
                max_images: 10,
            },
        )
        .await
        .unwrap();

    let first = service.start_job(user_id, job.id).await.unwrap();
    let enqueued_after_first = broker.enqueued_count().await;
    let second = service.start_job(user_id, job.id).await.unwrap();

    assert_eq!(first.task_ids, second.task_ids);
    assert_eq!(broker.enqueued_count().await, enqueued_after_first);
}

/// P8: a cancel on an already-cancelled job succeeds without revoke calls.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn second_cancel_on_cancelled_job_is_idempotent() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "idempotent-cancel").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into()],
                engines: vec!["google".into()],
                max_images: 10,
            },
        )
        .await
        .unwrap();
    service.start_job(user_id, job.id).await.unwrap();

    service.cancel_job(user_id, job.id).await.unwrap();
    let second = service.cancel_job(user_id, job.id).await.unwrap();
    assert_eq!(second.revoked_tasks, 0);
    assert_eq!(second.status, JobStatus::Cancelled);
}

/// R1: start -> cancel -> retry yields pending with zero counters and
/// empty task lists (spec.md §8 P10, R1).
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn start_cancel_retry_round_trip_resets_state() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "round-trip").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let job = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into()],
                engines: vec!["google".into(), "bing".into()],
                max_images: 20,
            },
        )
        .await
        .unwrap();

    service.start_job(user_id, job.id).await.unwrap();
    service.cancel_job(user_id, job.id).await.unwrap();
    let retried = service.retry_job(user_id, job.id).await.unwrap();

    assert_eq!(retried.status, JobStatus::Running);
    let fresh = service.get_job(user_id, job.id).await.unwrap();
    assert_eq!(fresh.completed_chunks, 0);
    assert_eq!(fresh.failed_chunks, 0);
    assert_eq!(fresh.downloaded_images, 0);
    assert!(fresh.processed_task_ids.is_empty());
}

/// P11: a request from a non-owner yields Forbidden regardless of status.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn non_owner_request_is_forbidden() {
    let pool = test_pool().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, owner, "ownership").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let job = service
        .create_job(
            owner,
            project.id,
            NewJobParams {
                keywords: vec!["cat".into()],
                engines: vec!["google".into()],
                max_images: 10,
            },
        )
        .await
        .unwrap();

    let err = service.get_job(stranger, job.id).await.unwrap_err();
    assert!(matches!(err, pixcrawler_orchestrator::error::CoreError::Forbidden(_)));
}

/// Scenario 4 (spec.md §8): empty keywords is a Validation error and
/// creates no row.
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn empty_keywords_is_rejected_before_any_row_is_created() {
    let pool = test_pool().await;
    let user_id = Uuid::new_v4();
    let project = ProjectRepository::create(&pool, user_id, "validation").await.unwrap();
    let (service, _broker) = service(pool.clone());

    let err = service
        .create_job(
            user_id,
            project.id,
            NewJobParams {
                keywords: vec![],
                engines: vec!["google".into()],
                max_images: 10,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, pixcrawler_orchestrator::error::CoreError::Validation(_)));
}

//! Retry coordinator (L4): two independent layers that never stack on the
//! same failure (spec.md §4.4). Neither reaches for a backoff crate — the
//! teacher codebase hand-rolls backoff loops inline (see
//! `bpmn_integration/worker.rs`-style retry code) rather than pulling in
//! e.g. `backoff`, so this module follows that precedent.

use std::future::Future;
use std::time::Duration;

use crate::error::CoreError;

/// Operation-layer retry: wraps a single outbound call. Triggers on any
/// Transient `CoreError`. Up to 3 attempts total, exponential backoff base
/// 2s capped at 10s; a `RateLimited` with a suggested wait honors it in
/// lieu of the computed backoff. Exhaustion re-raises the last failure.
pub async fn operation_retry<F, Fut, T>(mut f: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    const BASE: Duration = Duration::from_secs(2);
    const MAX: Duration = Duration::from_secs(10);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let wait = match &err {
                    CoreError::RateLimited {
                        retry_after: Some(suggested),
                    } => *suggested,
                    _ => backoff_delay(attempt, BASE, MAX),
                };
                tracing::warn!(
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "operation-layer retry"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let scaled = base.saturating_mul(1 << (attempt.saturating_sub(1)).min(8));
    scaled.min(max)
}

/// Task-layer retry: the worker runtime may re-queue a task only on
/// Infrastructure failures, at most 3 re-queues with a fixed 60s delay.
/// The task body invokes `should_requeue` explicitly — there is no
/// automatic re-queue on arbitrary error types (spec.md §4.4).
#[derive(Debug, Clone, Copy)]
pub struct TaskRetry {
    pub attempts: u32,
    pub max: u32,
    pub delay: Duration,
}

impl Default for TaskRetry {
    fn default() -> Self {
        Self {
            attempts: 0,
            max: 3,
            delay: Duration::from_secs(60),
        }
    }
}

impl TaskRetry {
    /// True only for `Infrastructure` failures while attempts remain.
    /// Permanent failures are never re-queued; Transient-but-not-
    /// Infrastructure failures belong to the operation layer, not this one.
    pub fn should_requeue(&self, err: &CoreError) -> bool {
        err.is_infrastructure() && self.attempts < self.max
    }

    /// Record one re-queue attempt, returning the delay to wait before the
    /// task runs again.
    pub fn record_requeue(&mut self) -> Duration {
        self.attempts += 1;
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = operation_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CoreError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_up_to_three_attempts_then_reraises() {
        let calls = AtomicU32::new(0);
        let result = operation_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(CoreError::Network("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_permanent_failures() {
        let calls = AtomicU32::new(0);
        let result = operation_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(CoreError::Validation("bad".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_one_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = operation_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::Timeout("slow".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn task_retry_allows_infrastructure_only_up_to_max() {
        let mut retry = TaskRetry::default();
        assert!(retry.should_requeue(&CoreError::Infrastructure("oom".into())));
        assert!(!retry.should_requeue(&CoreError::Validation("bad".into())));
        assert!(!retry.should_requeue(&CoreError::Timeout("slow".into())));

        for _ in 0..3 {
            retry.record_requeue();
        }
        assert!(!retry.should_requeue(&CoreError::Infrastructure("oom".into())));
    }

    #[test]
    fn backoff_delay_is_monotonic_and_capped() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(10);
        assert_eq!(backoff_delay(1, base, max), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base, max), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, base, max), Duration::from_secs(8));
        assert_eq!(backoff_delay(4, base, max), max);
    }
}

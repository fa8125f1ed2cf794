//! Task dispatcher (L3): a thin, stateless abstraction over an
//! asynchronous task broker. Grounded in `ob-poc`'s habit of wrapping an
//! external system behind a small trait with an in-process stand-in
//! (`database::locks` wraps Postgres advisory locks the same way the
//! broker here wraps an external queue).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::CoreError;

#[cfg(feature = "http-broker")]
pub mod http;

/// Named tasks the orchestrator dispatches, each with a distinct rate-limit
/// hint (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Download,
    ValidateFast,
    ValidateMedium,
    ValidateSlow,
}

impl TaskKind {
    pub fn task_name(self) -> &'static str {
        match self {
            TaskKind::Download => "download",
            TaskKind::ValidateFast => "validate_fast",
            TaskKind::ValidateMedium => "validate_medium",
            TaskKind::ValidateSlow => "validate_slow",
        }
    }

    /// Rate-limit hint attached at the task-name level (spec.md §4.3).
    /// Informational only — dispatch never fails on it.
    pub fn rate_limit_hint(self) -> &'static str {
        match self {
            TaskKind::Download => "10/min/engine",
            TaskKind::ValidateFast => "1000/min",
            TaskKind::ValidateMedium => "500/min",
            TaskKind::ValidateSlow => "100/min",
        }
    }
}

/// A task payload: only strings, integers, booleans, lists, and maps of the
/// same (spec.md P5). Builder that forbids anything else from compiling in
/// by construction: every setter takes an owned primitive or a `Value`
/// built from one.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskPayload(serde_json::Map<String, Value>);

impl TaskPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// True iff every leaf in the payload is a primitive JSON type — no
    /// handles, no references to in-process state (spec.md P5). Payloads
    /// built exclusively through `with` always satisfy this; the check
    /// exists for payloads deserialized from external callbacks.
    pub fn is_all_primitive(value: &Value) -> bool {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => true,
            Value::Array(items) => items.iter().all(Self::is_all_primitive),
            Value::Object(map) => map.values().all(Self::is_all_primitive),
        }
    }
}

/// Opaque task identifier returned by the broker.
pub type TaskId = String;

/// Capabilities of the task broker (spec.md §4.3, §6.3).
#[async_trait]
pub trait TaskBroker: Send + Sync {
    async fn enqueue(&self, kind: TaskKind, payload: TaskPayload) -> Result<TaskId, CoreError>;

    /// Best-effort cancellation; returns whether the broker accepted it.
    async fn revoke(&self, task_id: &str) -> Result<bool, CoreError>;

    /// Returns the count of accepted revocations.
    async fn revoke_many(&self, task_ids: &[TaskId]) -> Result<usize, CoreError> {
        let mut accepted = 0;
        for id in task_ids {
            if self.revoke(id).await? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }
}

/// In-memory broker for tests and local development. The orchestrator
/// never depends on its internals — only on the `TaskBroker` trait.
#[derive(Default)]
pub struct InMemoryBroker {
    enqueued: Mutex<HashMap<TaskId, (TaskKind, Value)>>,
    revoked: Mutex<Vec<TaskId>>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn enqueued_count(&self) -> usize {
        self.enqueued.lock().await.len()
    }

    pub async fn was_revoked(&self, task_id: &str) -> bool {
        self.revoked.lock().await.iter().any(|t| t == task_id)
    }
}

#[async_trait]
impl TaskBroker for InMemoryBroker {
    async fn enqueue(&self, kind: TaskKind, payload: TaskPayload) -> Result<TaskId, CoreError> {
        let value = payload.as_value();
        if !TaskPayload::is_all_primitive(&value) {
            return Err(CoreError::Validation(
                "task payload must contain only primitive JSON types".to_string(),
            ));
        }
        let task_id = uuid::Uuid::new_v4().to_string();
        self.enqueued
            .lock()
            .await
            .insert(task_id.clone(), (kind, value));
        Ok(task_id)
    }

    async fn revoke(&self, task_id: &str) -> Result<bool, CoreError> {
        let mut enqueued = self.enqueued.lock().await;
        let accepted = enqueued.remove(task_id).is_some();
        if accepted {
            self.revoked.lock().await.push(task_id.to_string());
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_returns_distinct_ids() {
        let broker = InMemoryBroker::new();
        let a = broker
            .enqueue(TaskKind::Download, TaskPayload::new().with("job_id", "j1"))
            .await
            .unwrap();
        let b = broker
            .enqueue(TaskKind::Download, TaskPayload::new().with("job_id", "j2"))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(broker.enqueued_count().await, 2);
    }

    #[tokio::test]
    async fn revoke_many_counts_only_accepted() {
        let broker = InMemoryBroker::new();
        let a = broker
            .enqueue(TaskKind::Download, TaskPayload::new())
            .await
            .unwrap();
        let accepted = broker
            .revoke_many(&[a.clone(), "unknown-task".to_string()])
            .await
            .unwrap();
        assert_eq!(accepted, 1);
        assert!(broker.was_revoked(&a).await);
    }

    #[test]
    fn payload_primitivity_rejects_nothing_but_primitives() {
        let ok = TaskPayload::new()
            .with("keyword", "cat")
            .with("cap", 25)
            .with("flag", true)
            .as_value();
        assert!(TaskPayload::is_all_primitive(&ok));
    }
}

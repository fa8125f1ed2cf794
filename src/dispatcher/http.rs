//! HTTP-backed broker client, grounded in `ob-poc`'s `reqwest`-based
//! external API clients (e.g. `src/agentic/anthropic_client.rs`): a thin
//! wrapper posting JSON and translating non-2xx responses through
//! `classify_http_status`.

#![cfg(feature = "http-broker")]

use async_trait::async_trait;
use serde::Deserialize;

use crate::dispatcher::{TaskBroker, TaskId, TaskKind, TaskPayload};
use crate::error::{classify_http_status, CoreError};

/// Dispatches tasks to an external broker reachable over HTTP.
pub struct HttpBroker {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct EnqueueResponse {
    task_id: String,
}

#[derive(Deserialize)]
struct RevokeResponse {
    accepted: bool,
}

impl HttpBroker {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn map_response(resp: reqwest::Response) -> Result<reqwest::Response, CoreError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(classify_http_status(status, body))
        }
    }
}

#[async_trait]
impl TaskBroker for HttpBroker {
    async fn enqueue(&self, kind: TaskKind, payload: TaskPayload) -> Result<TaskId, CoreError> {
        let body = serde_json::json!({
            "name": kind.task_name(),
            "payload": payload.as_value(),
        });

        let resp = self
            .client
            .post(format!("{}/tasks", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let resp = Self::map_response(resp).await?;
        let parsed: EnqueueResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        Ok(parsed.task_id)
    }

    async fn revoke(&self, task_id: &str) -> Result<bool, CoreError> {
        let resp = self
            .client
            .post(format!("{}/tasks/{task_id}/revoke", self.base_url))
            .send()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;

        let resp = Self::map_response(resp).await?;
        let parsed: RevokeResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::Network(e.to_string()))?;
        Ok(parsed.accepted)
    }
}

//! Entity kinds (spec.md §3), independent of how they are persisted.
//!
//! Mirrors `ob-poc`'s row-struct-plus-domain-struct split (see
//! `database::deal_repository::DealSummaryRow` / `DealSummary`): the
//! repository layer owns the `sqlx::FromRow` row shapes privately and
//! converts into these public domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle status (spec.md §3 Status enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A grouping owned by exactly one user (spec.md §3 Project).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The central entity (spec.md §3 CrawlJob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub project_id: Uuid,

    // Input parameters, immutable after creation.
    pub keywords: Vec<String>,
    pub engines: Vec<String>,
    pub max_images: u32,

    // Derived at start.
    pub total_chunks: u32,

    // Runtime counters.
    pub active_chunks: u32,
    pub completed_chunks: u32,
    pub failed_chunks: u32,
    pub downloaded_images: u32,
    pub valid_images: u32,

    // Tracking / dedup sets.
    pub task_ids: Vec<String>,
    pub processed_task_ids: Vec<String>,

    pub status: JobStatus,
    pub progress: u32,
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlJob {
    /// I6: progress = floor(100 * completed / total) when total > 0, else 0.
    pub fn compute_progress(completed_chunks: u32, total_chunks: u32) -> u32 {
        if total_chunks == 0 {
            0
        } else {
            (100 * completed_chunks as u64 / total_chunks as u64) as u32
        }
    }
}

/// Belongs to one job; created when a chunk completes successfully
/// (spec.md §3 Image).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub crawl_job_id: Uuid,
    pub source_url: String,
    pub storage_key: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bytes: Option<i64>,
    pub format: Option<String>,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
    pub is_valid: Option<bool>,
    pub is_duplicate: Option<bool>,
    pub labels: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A freshly-downloaded image as reported by a worker callback, before it
/// has a database identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImage {
    pub source_url: String,
    pub storage_key: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub bytes: Option<i64>,
    pub format: Option<String>,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
    pub labels: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// Chunk lifecycle status, restricted to spec.md §3 JobChunk values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

/// Used under the range-decomposition form (spec.md §3 JobChunk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobChunk {
    pub id: Uuid,
    pub crawl_job_id: Uuid,
    pub image_range_start: u32,
    pub image_range_end: u32,
    pub status: ChunkStatus,
    pub priority: i32,
    pub retry_count: u32,
    pub task_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Append-only row keyed by user_id, emitted on terminal job transitions
/// (spec.md §3 Notification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_floors_and_handles_zero_total() {
        assert_eq!(CrawlJob::compute_progress(0, 0), 0);
        assert_eq!(CrawlJob::compute_progress(1, 4), 25);
        assert_eq!(CrawlJob::compute_progress(2, 3), 66);
        assert_eq!(CrawlJob::compute_progress(3, 3), 100);
    }

    #[test]
    fn job_status_round_trips_through_db_string() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            let parsed: JobStatus = status.as_db_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn job_status_rejects_unknown() {
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}

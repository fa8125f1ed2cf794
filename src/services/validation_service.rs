//! Image validation (spec.md §4.6, L5 peer of `JobService`). Lives
//! alongside it in `services/` the way `database/cbu_service.rs` and
//! `database/entity_service.rs` sit as siblings under one module rather
//! than nested.

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use crate::database::image_repository::ImageRepository;
use crate::database::project_repository::ProjectRepository;
use crate::dispatcher::{TaskBroker, TaskKind, TaskPayload};
use crate::domain::Image;
use crate::error::CoreError;

/// Validation thoroughness requested by the caller (spec.md §4.6 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Fast,
    Medium,
    Slow,
}

impl ValidationLevel {
    fn task_kind(self) -> TaskKind {
        match self {
            ValidationLevel::Fast => TaskKind::ValidateFast,
            ValidationLevel::Medium => TaskKind::ValidateMedium,
            ValidationLevel::Slow => TaskKind::ValidateSlow,
        }
    }
}

impl std::str::FromStr for ValidationLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(ValidationLevel::Fast),
            "medium" => Ok(ValidationLevel::Medium),
            "slow" => Ok(ValidationLevel::Slow),
            other => Err(CoreError::Validation(format!(
                "unknown validation level: {other}"
            ))),
        }
    }
}

/// Result of one validation task as reported by a worker callback
/// (spec.md §4.6 `handle_validation_result`).
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub job_id: Uuid,
    pub images_count: usize,
    pub level: ValidationLevel,
    pub task_ids: Vec<String>,
}

pub struct ValidationService {
    pool: PgPool,
    broker: Arc<dyn TaskBroker>,
}

impl ValidationService {
    pub fn new(pool: PgPool, broker: Arc<dyn TaskBroker>) -> Self {
        Self { pool, broker }
    }

    /// spec.md §4.6 validate_job_images steps 1–5.
    pub async fn validate_job_images(
        &self,
        user_id: Uuid,
        job_id: Uuid,
        level: ValidationLevel,
    ) -> Result<ValidationOutcome, CoreError> {
        self.check_job_ownership(user_id, job_id).await?;

        let images = ImageRepository::get_by_job(&self.pool, job_id).await?;
        if images.is_empty() {
            return Err(CoreError::BadRequest(format!(
                "job {job_id} has no images to validate"
            )));
        }

        let kind = level.task_kind();
        let mut task_ids = Vec::with_capacity(images.len());
        for image in &images {
            let payload = TaskPayload::new()
                .with("image_id", image.id.to_string())
                .with("job_id", job_id.to_string());
            let task_id = self.broker.enqueue(kind, payload).await?;
            task_ids.push(task_id);
        }

        Ok(ValidationOutcome {
            job_id,
            images_count: images.len(),
            level,
            task_ids,
        })
    }

    async fn check_job_ownership(&self, user_id: Uuid, job_id: Uuid) -> Result<(), CoreError> {
        use crate::database::job_repository::CrawlJobRepository;
        let job = CrawlJobRepository::get(&self.pool, job_id).await?;
        let owner = ProjectRepository::get_owner(&self.pool, job.project_id).await?;
        if owner != user_id {
            return Err(CoreError::Forbidden(format!(
                "user {user_id} does not own job {job_id}"
            )));
        }
        Ok(())
    }

    /// spec.md §4.6 handle_validation_result.
    pub async fn handle_validation_result(
        &self,
        image_id: Uuid,
        result: ValidationResult,
    ) -> Result<Image, CoreError> {
        ImageRepository::mark_validated(&self.pool, image_id, result.is_valid, result.is_duplicate)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_level_parses_case_insensitively() {
        assert_eq!("Fast".parse::<ValidationLevel>().unwrap(), ValidationLevel::Fast);
        assert_eq!("MEDIUM".parse::<ValidationLevel>().unwrap(), ValidationLevel::Medium);
        assert_eq!("slow".parse::<ValidationLevel>().unwrap(), ValidationLevel::Slow);
    }

    #[test]
    fn validation_level_rejects_unknown() {
        assert!("glacial".parse::<ValidationLevel>().is_err());
    }
}

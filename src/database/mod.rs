//! Database connection management (L2 ambient), following `ob-poc`'s
//! `database::DatabaseManager` shape: a thin wrapper around a `PgPool`
//! that owns configuration and exposes repository constructors.

#![cfg(feature = "database")]

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::DatabaseConfig;

pub mod chunk_repository;
pub mod image_repository;
pub mod job_repository;
pub mod notification_repository;
pub mod project_repository;

pub use chunk_repository::JobChunkRepository;
pub use image_repository::ImageRepository;
pub use job_repository::CrawlJobRepository;
pub use notification_repository::NotificationRepository;
pub use project_repository::ProjectRepository;

/// Owns the connection pool and runs startup migrations.
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("failed to connect to database: {e}");
                e
            })?;

        info!("database connection pool created");
        Ok(Self { pool })
    }

    pub async fn with_default_config() -> Result<Self, sqlx::Error> {
        Self::new(DatabaseConfig::default()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the SQL files under `migrations/` via `sqlx::migrate!`,
    /// replacing the teacher's hand-rolled schema-presence check
    /// (`DatabaseManager::run_migrations` in `ob-poc`) with the real
    /// migrator, since spec.md calls for a genuinely versioned schema.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn close(self) {
        info!("closing database connection pool");
        self.pool.close().await;
    }
}

fn mask_database_url(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host_and_db)) => format!("postgresql://***@{host_and_db}"),
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_database_url_hides_credentials() {
        let masked = mask_database_url("postgresql://user:pw@localhost:5432/pixcrawler");
        assert!(masked.contains("***"));
        assert!(!masked.contains("pw"));
        assert!(masked.contains("localhost:5432/pixcrawler"));
    }

    #[test]
    fn mask_database_url_falls_back_on_unparsable_input() {
        assert_eq!(mask_database_url("not-a-url"), "***");
    }
}

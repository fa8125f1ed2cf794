//! Configuration (ambient, ungrounded directly in spec.md — follows
//! `ob-poc`'s `database::DatabaseConfig::default()` pattern of reading an
//! environment variable with a development-friendly fallback).

use std::time::Duration;

/// Connection-pool configuration for the relational store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/pixcrawler".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Which decomposition strategy new jobs use. Spec.md leaves the choice of
/// form per request to the implementer as "a configuration switch, not
/// guessed from incomplete source" — resolved here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStrategy {
    KeywordEngine,
    ImageRange { chunk_size: u32 },
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::KeywordEngine
    }
}

impl ChunkStrategy {
    fn from_env() -> Self {
        match std::env::var("ORCHESTRATOR_CHUNK_STRATEGY") {
            Ok(raw) if raw.starts_with("image_range") => {
                let chunk_size = raw
                    .split_once(':')
                    .and_then(|(_, n)| n.parse().ok())
                    .unwrap_or(50);
                ChunkStrategy::ImageRange { chunk_size }
            }
            _ => ChunkStrategy::KeywordEngine,
        }
    }
}

/// Chunking and job-service policy, spec.md §9 Open Questions resolved
/// into explicit configuration values.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub strategy: ChunkStrategy,
    /// `failed_chunks / total_chunks` at or above this ratio fails the job;
    /// below it, the job completes. Default 1.0: only all-failed fails.
    pub failure_threshold: f64,
    /// Upper bound on `max_images` accepted by `start_job`.
    pub max_images_cap: u32,
    /// Upper bound on `total_chunks` a single job may produce.
    pub max_chunks_cap: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::from_env(),
            failure_threshold: std::env::var("ORCHESTRATOR_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            max_images_cap: std::env::var("ORCHESTRATOR_MAX_IMAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
            max_chunks_cap: std::env::var("ORCHESTRATOR_MAX_CHUNKS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2_000),
        }
    }
}

/// HTTP server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_config_default_has_sane_pool_size() {
        let config = DatabaseConfig::default();
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert!(config.max_connections > 0);
    }

    #[test]
    fn chunking_config_default_is_keyword_engine_full_threshold() {
        let config = ChunkingConfig::default();
        assert_eq!(config.failure_threshold, 1.0);
    }
}

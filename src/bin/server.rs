//! Orchestrator HTTP entry point, grounded in `ob-poc-web`'s `main.rs`
//! shape: `tracing_subscriber` init, `dotenvy` load, pool connect,
//! migrate, assemble router, serve.

use std::net::SocketAddr;
use std::sync::Arc;

use pixcrawler_orchestrator::api::auth::StaticTokenVerifier;
use pixcrawler_orchestrator::api::{create_router, AppState};
use pixcrawler_orchestrator::config::{ChunkingConfig, DatabaseConfig, ServerConfig};
use pixcrawler_orchestrator::database::DatabaseManager;
use pixcrawler_orchestrator::dispatcher::http::HttpBroker;
use pixcrawler_orchestrator::dispatcher::InMemoryBroker;
use pixcrawler_orchestrator::services::DispatchRateLimiter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixcrawler_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting pixcrawler orchestrator");

    let db = DatabaseManager::new(DatabaseConfig::default()).await?;
    db.run_migrations().await?;
    tracing::info!("migrations applied");

    let broker: Arc<dyn pixcrawler_orchestrator::dispatcher::TaskBroker> =
        match std::env::var("TASK_BROKER_URL") {
            Ok(url) => {
                tracing::info!(broker_url = %url, "using HTTP task broker");
                Arc::new(HttpBroker::new(url))
            }
            Err(_) => {
                tracing::warn!("TASK_BROKER_URL not set, using in-memory broker (dev only)");
                InMemoryBroker::new()
            }
        };

    let rate_limiter = Arc::new(DispatchRateLimiter::new(
        std::env::var("ORCHESTRATOR_DISPATCH_RATE_PER_MINUTE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60),
    ));

    let state = AppState::new(
        db.pool().clone(),
        broker,
        ChunkingConfig::default(),
        rate_limiter,
        Arc::new(StaticTokenVerifier),
    );

    let app = create_router(state);

    let server_config = ServerConfig::default();
    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

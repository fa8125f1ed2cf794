//! Request handlers (L6, spec.md §4.7): thin translation from HTTP to
//! service calls. No datastore access, no dispatcher access, no business
//! rules live here — grounded in the teacher's `create_deal_router`
//! shape (`#[derive(Clone)] struct ...State { pool, .. }`, one router
//! builder per resource, assembled under a versioned prefix in `main`).

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::auth::IdentityVerifier;
use crate::config::ChunkingConfig;
use crate::dispatcher::TaskBroker;
use crate::services::{DispatchRateLimiter, JobService, ValidationService};

pub mod auth;
pub mod callbacks;
pub mod jobs;
pub mod projects;
pub mod validation;

/// Pagination envelope for collection responses (spec.md §6.1: "collections
/// return `{"data": [...], "meta": {total, page, limit, pages}}`").
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let limit = limit.max(1);
        let pages = (total + limit - 1) / limit;
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionEnvelope<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Shared handler state (spec.md §4.7: "invokes the appropriate service
/// method"). Cloned cheaply per request, as `DealState`/`ClientState` are
/// in the teacher.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub job_service: Arc<JobService>,
    pub validation_service: Arc<ValidationService>,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        broker: Arc<dyn TaskBroker>,
        chunking_config: ChunkingConfig,
        rate_limiter: Arc<DispatchRateLimiter>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        let job_service = Arc::new(JobService::new(
            pool.clone(),
            broker.clone(),
            chunking_config,
            rate_limiter,
        ));
        let validation_service = Arc::new(ValidationService::new(pool.clone(), broker));
        Self {
            pool,
            job_service,
            validation_service,
            identity,
        }
    }
}

/// Assembles the `/api/v1` router (spec.md §6.1): authenticated resource
/// routes behind `auth::require_identity`, plus unauthenticated worker
/// callback routes (spec.md §6.3 — workers are an internal collaborator
/// invoked by the broker, not a bearer-token-bearing end user).
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/projects", post(projects::create_project))
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id", axum::routing::delete(projects::delete_project))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/start", post(jobs::start_job))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/stop", post(jobs::cancel_job))
        .route("/jobs/:id/retry", post(jobs::retry_job))
        .route("/jobs/:id/progress", get(jobs::job_progress))
        .route("/validation/job/:id", post(validation::validate_job_images))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_identity,
        ));

    let callback_routes = Router::new()
        .route(
            "/jobs/:job_id/tasks/:task_id/complete",
            post(callbacks::handle_task_completion),
        )
        .route(
            "/validation/images/:image_id/complete",
            post(callbacks::handle_validation_result),
        );

    Router::new()
        .nest(
            "/api/v1",
            authenticated.merge(callback_routes).with_state(state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

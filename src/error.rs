//! Error taxonomy (L1).
//!
//! Every failure raised anywhere in the core is one of ten kinds, split
//! into two disjoint classes: Permanent (never retried) and Transient
//! (retried by exactly one of the two retry layers in `crate::retry`).
//! This module is the single place that classifies — no other layer may
//! re-derive "is this retryable" from a string or a status code.

use std::time::Duration;

use thiserror::Error;

/// The full error taxonomy of spec.md §4.1.
#[derive(Debug, Error)]
pub enum CoreError {
    // -- Permanent: never retried by any layer --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    // -- Transient: retried by the operation or task layer --
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl CoreError {
    /// True for the five Transient kinds, false for the five Permanent kinds.
    ///
    /// This is the only predicate either retry layer consults.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout(_)
                | CoreError::Network(_)
                | CoreError::RateLimited { .. }
                | CoreError::ServiceUnavailable(_)
                | CoreError::Infrastructure(_)
        )
    }

    /// True for the five Permanent kinds.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Only `Infrastructure` failures may be re-queued by the task layer.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, CoreError::Infrastructure(_))
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        CoreError::RateLimited { retry_after }
    }
}

/// Classification rules for remote HTTP-style responses (spec.md §4.1):
/// `{400→BadRequest, 401→Unauthorized, 403→Forbidden, 404→NotFound,
/// 429→RateLimited, 503/504→ServiceUnavailable, other 4xx→Permanent(bad
/// request), other 5xx→ServiceUnavailable}`.
pub fn classify_http_status(status: u16, body: impl Into<String>) -> CoreError {
    let body = body.into();
    match status {
        400 => CoreError::BadRequest(body),
        401 => CoreError::Unauthorized,
        403 => CoreError::Forbidden(body),
        404 => CoreError::NotFound(body),
        429 => CoreError::RateLimited { retry_after: None },
        503 | 504 => CoreError::ServiceUnavailable(body),
        400..=499 => CoreError::BadRequest(body),
        500..=599 => CoreError::ServiceUnavailable(body),
        _ => CoreError::Infrastructure(format!("unexpected status {status}: {body}")),
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
            other => CoreError::Infrastructure(other.to_string()),
        }
    }
}

#[cfg(feature = "server")]
impl axum::response::IntoResponse for CoreError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        use axum::Json;

        let (status, error_code) = match &self {
            CoreError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation"),
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            CoreError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            CoreError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            CoreError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            CoreError::Timeout(_) => (StatusCode::INTERNAL_SERVER_ERROR, "timeout"),
            CoreError::Network(_) => (StatusCode::INTERNAL_SERVER_ERROR, "network"),
            CoreError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            CoreError::ServiceUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "service_unavailable")
            }
            CoreError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure")
            }
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error_kind = error_code, error = %self, "request failed");
        } else {
            tracing::warn!(error_kind = error_code, error = %self, "request rejected");
        }

        let request_id = uuid::Uuid::new_v4();
        let body = serde_json::json!({
            "message": self.to_string(),
            "details": [{ "detail": self.to_string(), "error_code": error_code }],
            "request_id": request_id,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_kinds_are_not_transient() {
        assert!(!CoreError::Validation("x".into()).is_transient());
        assert!(!CoreError::NotFound("x".into()).is_transient());
        assert!(!CoreError::Unauthorized.is_transient());
        assert!(!CoreError::Forbidden("x".into()).is_transient());
        assert!(!CoreError::BadRequest("x".into()).is_transient());
    }

    #[test]
    fn transient_kinds_are_transient() {
        assert!(CoreError::Timeout("x".into()).is_transient());
        assert!(CoreError::Network("x".into()).is_transient());
        assert!(CoreError::rate_limited(None).is_transient());
        assert!(CoreError::ServiceUnavailable("x".into()).is_transient());
        assert!(CoreError::Infrastructure("x".into()).is_transient());
    }

    #[test]
    fn only_infrastructure_is_infrastructure() {
        assert!(CoreError::Infrastructure("x".into()).is_infrastructure());
        assert!(!CoreError::ServiceUnavailable("x".into()).is_infrastructure());
        assert!(!CoreError::Timeout("x".into()).is_infrastructure());
    }

    #[test]
    fn classify_http_status_matches_spec_table() {
        assert!(matches!(
            classify_http_status(400, "x"),
            CoreError::BadRequest(_)
        ));
        assert!(matches!(
            classify_http_status(401, "x"),
            CoreError::Unauthorized
        ));
        assert!(matches!(
            classify_http_status(403, "x"),
            CoreError::Forbidden(_)
        ));
        assert!(matches!(
            classify_http_status(404, "x"),
            CoreError::NotFound(_)
        ));
        assert!(matches!(
            classify_http_status(429, "x"),
            CoreError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_http_status(503, "x"),
            CoreError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_http_status(504, "x"),
            CoreError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify_http_status(418, "x"),
            CoreError::BadRequest(_)
        ));
        assert!(matches!(
            classify_http_status(500, "x"),
            CoreError::ServiceUnavailable(_)
        ));
    }
}

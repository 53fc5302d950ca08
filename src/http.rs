//! HTTP front end over the named limiters.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::{
    error::RateLimitError,
    limiter::AttemptDecision,
    service::RateLimitService,
    utils::format_retry_message,
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RateLimitService>,
}

/// Optional `?subject=` selecting whose record to use
#[derive(Debug, Default, Deserialize)]
pub struct SubjectQuery {
    pub subject: Option<String>,
}

impl SubjectQuery {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize)]
struct DecisionBody {
    limiter: String,
    allowed: bool,
    #[serde(flatten)]
    decision: AttemptDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Error response for the limiter endpoints
pub struct ApiError(RateLimitError);

impl From<RateLimitError> for ApiError {
    fn from(e: RateLimitError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RateLimitError::LimiterNotFound(_) => StatusCode::NOT_FOUND,
            _ => {
                warn!("limiter request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Routes for health, metrics and the limiter operations
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/limits/:name", get(check_handler).delete(clear_handler))
        .route("/limits/:name/attempts", post(record_handler))
        .with_state(state)
}

async fn check_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SubjectQuery>,
) -> Result<Response, ApiError> {
    let decision = state.service.check(&name, query.subject()).await?;

    let body = DecisionBody {
        limiter: name,
        allowed: decision.is_allowed(),
        decision,
        message: decision.retry_after_secs().map(format_retry_message),
    };

    let response = match decision.retry_after_secs() {
        None => (StatusCode::OK, Json(body)).into_response(),
        Some(retry_after_secs) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs.to_string())],
            Json(body),
        )
            .into_response(),
    };
    Ok(response)
}

async fn record_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SubjectQuery>,
) -> Result<StatusCode, ApiError> {
    state.service.record(&name, query.subject()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SubjectQuery>,
) -> Result<StatusCode, ApiError> {
    state.service.clear(&name, query.subject()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    match state.service.health_check().await {
        Ok(()) => Ok(Json(json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339()
        }))),
        Err(e) => {
            warn!("health check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = state.service.metrics().registry().gather();

    match encoder.encode_to_string(&metric_families) {
        Ok(metrics) => Ok(metrics),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

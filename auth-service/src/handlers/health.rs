use axum::{extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::ServiceResponse;

use crate::AppState;

/// Service health check.
///
/// Answers 503 with the same report when the database ping fails, so load
/// balancers can take the instance out of rotation.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health_service.check().await;

    if report.is_healthy() {
        ServiceResponse::success(
            "Service is healthy - Successfully connected to database",
            report,
            StatusCode::OK,
        )
    } else {
        tracing::warn!("Health check failed: database unreachable");
        ServiceResponse::failure(
            "Service unavailable - Database connection failed",
            Some(report),
            StatusCode::SERVICE_UNAVAILABLE,
        )
    }
}

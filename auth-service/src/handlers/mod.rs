//! HTTP handlers for auth-service.

pub mod auth;
pub mod health;

pub use auth::*;
pub use health::health_check;

use service_core::error::AppError;

/// Fallback for unmatched routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("The requested resource was not found".to_string())
}

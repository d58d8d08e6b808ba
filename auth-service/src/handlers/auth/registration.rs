use axum::{extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::{AppError, ServiceResponse};

use crate::{
    dtos::auth::{RegisterRequest, RegisterResponse},
    utils::ValidatedJson,
    AppState,
};

/// Register a new user
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth_service.register(req).await?;

    Ok(ServiceResponse::success(
        "User registered successfully",
        RegisterResponse { user },
        StatusCode::CREATED,
    ))
}

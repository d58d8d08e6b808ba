use axum::{extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::{AppError, ServiceResponse};

use crate::{
    dtos::auth::{LoginRequest, RefreshRequest},
    middleware::AuthUser,
    services::TokenClaims,
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.login(req).await?;
    Ok(ServiceResponse::success("Login successful", res, StatusCode::OK))
}

/// Exchange a refresh token for a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.refresh(req).await?;
    Ok(ServiceResponse::success("Token refreshed", res, StatusCode::OK))
}

/// Echo the verified access-token claims
pub async fn me(AuthUser(claims): AuthUser) -> impl IntoResponse {
    ServiceResponse::success("Current user", TokenClaims::Access(claims), StatusCode::OK)
}

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{services::AccessTokenClaims, AppState};

/// Upper bound on a bearer token, checked before any decoding work.
pub const MAX_TOKEN_SIZE: usize = 8192;

/// Middleware to require a valid access token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized("Authentication required - No token provided".to_string())
        })?;

    if token.len() > MAX_TOKEN_SIZE {
        return Err(AppError::BadRequest(
            "Security violation: Token exceeds maximum allowed size".to_string(),
        ));
    }

    let claims = state.jwt.verify_access_token(token)?;

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to get the verified claims in handlers behind [`auth_middleware`].
pub struct AuthUser(pub AccessTokenClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .ok_or_else(|| {
                AppError::Unauthorized("Authentication required - No token provided".to_string())
            })?;

        Ok(AuthUser(claims.clone()))
    }
}

use service_core::error::AppError;
use thiserror::Error;

use crate::services::jwt::TokenError;
use crate::services::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailAlreadyRegistered,

    #[error("User no longer exists")]
    UserNoLongerExists,
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => AppError::InternalError(anyhow::Error::new(e)),
            other => AppError::InvalidToken(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable => AppError::ServiceUnavailable(err.to_string()),
            RepositoryError::UniqueViolation(constraint) => AppError::Conflict(format!(
                "Unique constraint violated: {}",
                constraint
            )),
            RepositoryError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Repository(e) => e.into(),
            ServiceError::Token(e) => e.into(),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials
            | ServiceError::UserNoLongerExists => AppError::Unauthorized(err.to_string()),
            ServiceError::EmailAlreadyRegistered => AppError::Conflict(err.to_string()),
        }
    }
}

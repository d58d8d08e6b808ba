use std::sync::Arc;
use uuid::Uuid;

use crate::{
    dtos::auth::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse},
    dtos::auth::RegisterRequest,
    models::{NewUser, PublicUser},
    services::{
        repository::{RepositoryError, UserRepository},
        JwtService, ServiceError,
    },
    utils::{hash_password, verify_password, Password, PasswordHashString},
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt: JwtService,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, jwt: JwtService) -> Self {
        Self { users, jwt }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<PublicUser, ServiceError> {
        if self.users.find_by_email(&req.email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(Password::new(req.password)).await?;

        // A concurrent registration can still win the race to the unique index.
        let user = self
            .users
            .create(NewUser {
                name: req.name,
                email: req.email,
                password_hash: password_hash.into_string(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::UniqueViolation(_) => ServiceError::EmailAlreadyRegistered,
                other => ServiceError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(user.to_public())
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let user = self
            .users
            .find_by_email(&req.email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let valid = verify_password(
            Password::new(req.password),
            PasswordHashString::new(user.password_hash.clone()),
        )
        .await?;

        if !valid {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(ServiceError::InvalidCredentials);
        }

        let user_id = user.id.to_string();
        let access_token = self.jwt.sign_access_token(&user_id, &user.email)?;
        let refresh_token = self.jwt.sign_refresh_token(&user_id)?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginResponse {
            user: user.to_public(),
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expires_in().to_string(),
        })
    }

    /// Issue a fresh pair for a valid refresh token.
    ///
    /// The presented token is not revoked and stays usable until it expires.
    pub async fn refresh(&self, req: RefreshRequest) -> Result<RefreshResponse, ServiceError> {
        let claims = self.jwt.verify_refresh_token(&req.refresh_token)?;

        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| ServiceError::UserNoLongerExists)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNoLongerExists)?;

        let subject = user.id.to_string();
        let access_token = self.jwt.sign_access_token(&subject, &user.email)?;
        let refresh_token = self.jwt.sign_refresh_token(&subject)?;

        Ok(RefreshResponse {
            access_token,
            refresh_token,
            expires_in: self.jwt.access_token_expires_in().to_string(),
        })
    }
}

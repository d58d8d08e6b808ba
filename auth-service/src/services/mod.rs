//! Services layer: authentication, health and persistence.

pub mod auth;
pub mod database;
pub mod error;
pub mod health;
pub mod jwt;
pub mod repository;

pub use auth::AuthService;
pub use database::Database;
pub use error::ServiceError;
pub use health::{HealthReport, HealthService};
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenClaims, TokenError};
pub use repository::{DatabaseHealth, InMemoryUserRepository, RepositoryError, UserRepository};

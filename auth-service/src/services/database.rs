//! PostgreSQL-backed user repository.
//!
//! Every query runs through the shared [`DbGuard`], so transient failures are
//! retried and a struggling database trips the circuit breaker.

use async_trait::async_trait;
use service_core::resilience::{CircuitBreakerError, DbGuard};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::db::DbError;
use crate::models::{NewUser, User};
use crate::services::repository::{DatabaseHealth, RepositoryError, UserRepository};

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at, updated_at";

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    guard: DbGuard,
}

impl Database {
    pub fn new(pool: PgPool, guard: DbGuard) -> Self {
        Self { pool, guard }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn guard(&self) -> &DbGuard {
        &self.guard
    }
}

impl From<CircuitBreakerError<DbError>> for RepositoryError {
    fn from(err: CircuitBreakerError<DbError>) -> Self {
        match err {
            CircuitBreakerError::Open => RepositoryError::Unavailable,
            CircuitBreakerError::Inner(e) => match e.unique_violation() {
                Some(constraint) => RepositoryError::UniqueViolation(constraint),
                None => RepositoryError::Database(anyhow::Error::new(e.0)),
            },
        }
    }
}

#[async_trait]
impl UserRepository for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let pool = &self.pool;
        let query = query.as_str();

        self.guard
            .run("find_user_by_email", move || async move {
                sqlx::query_as::<_, User>(query)
                    .bind(email)
                    .fetch_optional(pool)
                    .await
                    .map_err(DbError)
            })
            .await
            .map_err(RepositoryError::from)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let pool = &self.pool;
        let query = query.as_str();

        self.guard
            .run("find_user_by_id", move || async move {
                sqlx::query_as::<_, User>(query)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .map_err(DbError)
            })
            .await
            .map_err(RepositoryError::from)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let user = User::new(new_user);
        let query = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        let pool = &self.pool;
        let query = query.as_str();
        let user = &user;

        self.guard
            .run("create_user", move || async move {
                sqlx::query_as::<_, User>(query)
                    .bind(user.id)
                    .bind(&user.name)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(user.created_at)
                    .bind(user.updated_at)
                    .fetch_one(pool)
                    .await
                    .map_err(DbError)
            })
            .await
            .map_err(RepositoryError::from)
    }
}

#[async_trait]
impl DatabaseHealth for Database {
    /// Bypasses the breaker: health must reflect the database, not the breaker.
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                RepositoryError::Database(anyhow::Error::new(e))
            })
    }
}

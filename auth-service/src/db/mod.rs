//! Database module for PostgreSQL connection management.

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use service_core::resilience::{Transient, TransientKind};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.url.expose_secret())
        .await?;

    tracing::info!("Successfully connected to PostgreSQL");

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}

/// `sqlx::Error` classified for the retry loop.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct DbError(#[from] pub sqlx::Error);

impl DbError {
    /// Name of the violated unique constraint, if that is what this is.
    pub fn unique_violation(&self) -> Option<String> {
        match &self.0 {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => Some(
                db.constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| "unique".to_string()),
            ),
            _ => None,
        }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

impl Transient for DbError {
    fn transient_kind(&self) -> Option<TransientKind> {
        classify(&self.0)
    }
}

fn classify(err: &sqlx::Error) -> Option<TransientKind> {
    match err {
        sqlx::Error::PoolTimedOut => Some(TransientKind::ConnectionTimeout),
        sqlx::Error::Tls(_) => Some(TransientKind::TlsFailure),
        sqlx::Error::Io(io) => match io.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable | ErrorKind::NotConnected => {
                Some(TransientKind::Unreachable)
            }
            ErrorKind::TimedOut => Some(TransientKind::ConnectionTimeout),
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Some(TransientKind::ConnectionClosed),
            _ => None,
        },
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // invalid_password / too_many_connections
            Some("28P01") | Some("53300") => Some(TransientKind::AuthUnderLoad),
            // query_canceled (statement_timeout)
            Some("57014") => Some(TransientKind::OperationTimeout),
            // admin_shutdown / connection_failure
            Some("57P01") | Some("08006") => Some(TransientKind::ConnectionClosed),
            Some("08001") => Some(TransientKind::Unreachable),
            Some(UNIQUE_VIOLATION) => Some(TransientKind::UniqueConstraintRace),
            _ => None,
        },
        _ => None,
    }
}

use auth_service::{
    build_router,
    config::AuthConfig,
    db::{create_pool, run_migrations},
    services::Database,
    AppState,
};
use service_core::error::AppError;
use service_core::observability::{init_tracing, shutdown_tracing};
use service_core::resilience::{CircuitBreaker, DbGuard};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::oneshot};

/// In-flight requests get this long to drain once a shutdown signal arrives.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment(),
        "Starting authentication service"
    );

    let pool = create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;
    run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.into()))?;

    let breaker = Arc::new(CircuitBreaker::new(
        "postgres",
        config.resilience.circuit_breaker_config(),
    ));
    let guard = DbGuard::new(breaker, config.resilience.retry_config());
    let database = Arc::new(Database::new(pool.clone(), guard));

    let state = AppState::new(config.clone(), database.clone(), database)?;
    let app = build_router(state)?;

    let addr = config.common.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => {
            joined.map_err(|e| AppError::InternalError(e.into()))??;
        }
        _ = shutdown_rx => {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(joined) => joined.map_err(|e| AppError::InternalError(e.into()))??,
                Err(_) => {
                    tracing::warn!(
                        grace_secs = SHUTDOWN_GRACE.as_secs(),
                        "Requests still in flight after grace period, forcing shutdown"
                    );
                    server.abort();
                }
            }
        }
    }

    pool.close().await;
    tracing::info!("Service shutdown complete");
    shutdown_tracing();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}

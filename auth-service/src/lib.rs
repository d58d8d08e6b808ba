pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Response},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    create_ip_rate_limiter, error_envelope_middleware, ip_rate_limit_middleware,
    make_request_span, request_id_middleware, security_headers_middleware, IpRateLimiter,
    CORRELATION_ID_HEADER, REQUEST_ID_HEADER,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::AuthConfig;
use crate::services::{AuthService, DatabaseHealth, HealthService, JwtService, UserRepository};
use service_core::error::AppError;

/// Every route is mounted below this prefix.
pub const API_BASE_PATH: &str = "/api";

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub health_service: HealthService,
    pub rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserRepository>,
        db_health: Arc<dyn DatabaseHealth>,
    ) -> Result<Self, AppError> {
        let jwt = JwtService::new(&config.jwt).map_err(AppError::ConfigError)?;
        let auth_service = AuthService::new(users, jwt.clone());
        let health_service = HealthService::new(db_health, config.environment());
        let rate_limiter =
            create_ip_rate_limiter(config.rate_limit.requests, config.rate_limit.window_seconds);

        Ok(Self {
            config,
            jwt,
            auth_service,
            health_service,
            rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let protected_routes = Router::new()
        .route("/me", get(handlers::me))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // Health stays outside the limiter so health checks are never throttled.
    let auth_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .merge(protected_routes)
        .route_layer(from_fn_with_state(
            state.rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .route("/health", get(handlers::health_check));

    let exposure = state.config.environment().error_exposure();
    let cors = cors_layer(&state.config.security.allowed_origins);

    let app = Router::new()
        .nest(API_BASE_PATH, api)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(from_fn_with_state(exposure, error_envelope_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors);

    Ok(app)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Skipping invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(CORRELATION_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");

    AppError::InternalError(anyhow::anyhow!("Handler panicked: {}", detail)).into_response()
}

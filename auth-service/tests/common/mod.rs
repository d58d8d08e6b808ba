//! Test helper module for auth-service integration tests.
//!
//! Spawns the full router on a random local port, backed by the in-memory
//! user repository instead of PostgreSQL.

#![allow(dead_code)]

use async_trait::async_trait;
use auth_service::{
    build_router,
    config::AuthConfig,
    models::{NewUser, User},
    services::{DatabaseHealth, InMemoryUserRepository, RepositoryError, UserRepository},
    AppState,
};
use serde_json::{json, Value};
use service_core::config::{Config, Environment};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const TEST_ACCESS_SECRET: &str = "test-access-secret-with-at-least-32-chars";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-with-at-least-32-chars";
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Test application with a running HTTP server.
pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryUserRepository>,
    pub state: AppState,
    client: reqwest::Client,
}

/// What the app under test talks to instead of PostgreSQL.
#[derive(Default)]
pub enum Backend {
    #[default]
    InMemory,
    /// Every user and health call fails with an unexpected database error.
    Failing,
    /// In-memory store whose email lookups always miss, so a duplicate
    /// registration only fails at insert time on the unique index.
    LostRace,
}

pub struct TestOptions {
    pub environment: Environment,
    pub overrides: Vec<(&'static str, String)>,
    pub backend: Backend,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            environment: Environment::Test,
            overrides: Vec::new(),
            backend: Backend::InMemory,
        }
    }
}

pub fn test_config(environment: Environment, overrides: &[(&'static str, String)]) -> AuthConfig {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://localhost/auth_test".to_string()),
        ("JWT_ACCESS_SECRET", TEST_ACCESS_SECRET.to_string()),
        ("JWT_REFRESH_SECRET", TEST_REFRESH_SECRET.to_string()),
        ("SERVICE_NAME", "auth-service-test".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(*key, value.clone());
    }

    let common = Config {
        environment,
        ..Config::default()
    };

    AuthConfig::from_lookup(common, |key| vars.get(key).cloned())
        .expect("Failed to build test config")
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(TestOptions::default()).await
    }

    pub async fn spawn_with(options: TestOptions) -> Self {
        let config = test_config(options.environment, &options.overrides);
        let repo = Arc::new(InMemoryUserRepository::new());

        let users: Arc<dyn UserRepository>;
        let db_health: Arc<dyn DatabaseHealth>;
        match options.backend {
            Backend::InMemory => {
                users = repo.clone();
                db_health = repo.clone();
            }
            Backend::Failing => {
                let failing = Arc::new(FailingRepository);
                users = failing.clone();
                db_health = failing;
            }
            Backend::LostRace => {
                users = Arc::new(StaleLookupRepository(repo.clone()));
                db_health = repo.clone();
            }
        }

        let state = AppState::new(config, users, db_health).expect("Failed to build app state");
        let app = build_router(state.clone()).expect("Failed to build router");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let _ = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await;
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            repo,
            state,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.address, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn register(&self, email: &str) -> reqwest::Response {
        self.post_json(
            "/auth/register",
            &json!({ "name": "Test User", "email": email, "password": TEST_PASSWORD }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_json(
            "/auth/login",
            &json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Register then log in, returning the login `responseObject`.
    pub async fn register_and_login(&self, email: &str) -> Value {
        let res = self.register(email).await;
        assert_eq!(res.status(), 201, "registration failed");

        let res = self.login(email, TEST_PASSWORD).await;
        assert_eq!(res.status(), 200, "login failed");

        let body: Value = res.json().await.expect("Failed to parse response");
        body["responseObject"].clone()
    }
}

/// Backend whose every call fails with an unexpected database error.
#[derive(Default)]
pub struct FailingRepository;

impl FailingRepository {
    fn failure() -> RepositoryError {
        RepositoryError::Database(anyhow::anyhow!("relation \"users\" does not exist"))
    }
}

#[async_trait]
impl UserRepository for FailingRepository {
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepositoryError> {
        Err(Self::failure())
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, RepositoryError> {
        Err(Self::failure())
    }

    async fn create(&self, _user: NewUser) -> Result<User, RepositoryError> {
        Err(Self::failure())
    }
}

#[async_trait]
impl DatabaseHealth for FailingRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Err(Self::failure())
    }
}

/// Delegates to the in-memory store but never finds a user by email, as if a
/// concurrent registration committed between the lookup and the insert.
pub struct StaleLookupRepository(pub Arc<InMemoryUserRepository>);

#[async_trait]
impl UserRepository for StaleLookupRepository {
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(None)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.0.find_by_id(id).await
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.0.create(user).await
    }
}

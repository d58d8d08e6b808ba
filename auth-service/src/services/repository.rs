//! Persistence seams for users and database liveness.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewUser, User};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Database circuit breaker is open")]
    Unavailable,

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Process-local repository used by tests and local runs without PostgreSQL.
///
/// `set_available(false)` simulates an outage: CRUD calls fail as if the
/// circuit were open and `ping` fails like a refused connection.
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
    available: AtomicBool,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn remove(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.remove(&id))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|users| users.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, User>>, RepositoryError> {
        self.users
            .lock()
            .map_err(|e| RepositoryError::Database(anyhow::anyhow!("In-memory user store poisoned: {}", e)))
    }

    fn ensure_available(&self) -> Result<(), RepositoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepositoryError::Unavailable)
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.ensure_available()?;
        Ok(self.lock()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.ensure_available()?;
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        self.ensure_available()?;
        let mut users = self.lock()?;
        if users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::UniqueViolation("users_email_key".to_string()));
        }

        let user = User::new(user);
        users.insert(user.id, user.clone());
        Ok(user)
    }
}

#[async_trait]
impl DatabaseHealth for InMemoryUserRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RepositoryError::Database(anyhow::anyhow!("connection refused")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create(new_user("a@example.com")).await.unwrap();

        let by_email = repo.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(repo.find_by_id(user.id).await.unwrap().is_some());
        assert!(repo.find_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let repo = InMemoryUserRepository::new();
        repo.create(new_user("a@example.com")).await.unwrap();

        let err = repo.create(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueViolation(_)));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn outage_fails_calls_and_ping() {
        let repo = InMemoryUserRepository::new();
        repo.set_available(false);

        assert!(matches!(
            repo.find_by_email("a@example.com").await,
            Err(RepositoryError::Unavailable)
        ));
        assert!(repo.ping().await.is_err());

        repo.set_available(true);
        assert!(repo.ping().await.is_ok());
    }
}

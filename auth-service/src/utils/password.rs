use anyhow::Context;
use std::fmt;

/// bcrypt work factor.
pub const BCRYPT_COST: u32 = 10;

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password with bcrypt on the blocking pool.
///
/// Salt is generated per call and embedded in the hash.
pub async fn hash_password(password: Password) -> Result<PasswordHashString, anyhow::Error> {
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password.as_str(), BCRYPT_COST))
        .await
        .context("Password hashing task failed")?
        .context("Failed to hash password")?;

    Ok(PasswordHashString::new(hash))
}

/// Check a password against a stored bcrypt hash on the blocking pool.
///
/// `Ok(false)` means a mismatch; `Err` means the hash itself is unusable.
pub async fn verify_password(
    password: Password,
    password_hash: PasswordHashString,
) -> Result<bool, anyhow::Error> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password.as_str(), password_hash.as_str()))
        .await
        .context("Password verification task failed")?
        .context("Invalid password hash format")
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{JwtConfig, TokenTtl};

/// JWT service for token generation and validation (HS256).
#[derive(Clone)]
pub struct JwtService {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    access_token_ttl: TokenTtl,
    refresh_token_ttl: TokenTtl,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub jti: String,
}

/// Claims for refresh tokens (long-lived, not persisted)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Token payload; the variant is carried in the `type` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenClaims {
    Access(AccessTokenClaims),
    Refresh(RefreshTokenClaims),
}

impl TokenClaims {
    pub fn kind(&self) -> &'static str {
        match self {
            TokenClaims::Access(_) => "access",
            TokenClaims::Refresh(_) => "refresh",
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token type: expected {expected}, got {actual}")]
    InvalidTokenType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Token rejected: {0}")]
    SignatureOrExpiry(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        let access_secret = config.access_secret.expose_secret().as_bytes();
        if access_secret.is_empty() {
            anyhow::bail!("JWT access secret must not be empty");
        }

        let refresh_secret = config
            .refresh_secret
            .as_ref()
            .map(|s| s.expose_secret().as_bytes())
            .unwrap_or(access_secret);

        if config.refresh_secret.is_none() {
            tracing::warn!("JWT_REFRESH_SECRET not set, refresh tokens share the access secret");
        }

        Ok(Self {
            access_encoding_key: EncodingKey::from_secret(access_secret),
            access_decoding_key: DecodingKey::from_secret(access_secret),
            refresh_encoding_key: EncodingKey::from_secret(refresh_secret),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret),
            access_token_ttl: config.access_token_ttl.clone(),
            refresh_token_ttl: config.refresh_token_ttl.clone(),
        })
    }

    pub fn sign_access_token(&self, user_id: &str, email: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl.as_seconds());

        let claims = TokenClaims::Access(AccessTokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        });

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding_key)
            .map_err(TokenError::Signing)
    }

    pub fn sign_refresh_token(&self, user_id: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.refresh_token_ttl.as_seconds());

        let claims = TokenClaims::Refresh(RefreshTokenClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        });

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding_key)
            .map_err(TokenError::Signing)
    }

    fn decode_claims(&self, token: &str, key: &DecodingKey) -> Result<TokenClaims, TokenError> {
        // Pinned to HS256; a token's own `alg` header is never trusted.
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<TokenClaims>(token, key, &validation)?;
        Ok(token_data.claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        match self.decode_claims(token, &self.access_decoding_key)? {
            TokenClaims::Access(claims) => Ok(claims),
            other => Err(TokenError::InvalidTokenType {
                expected: "access",
                actual: other.kind(),
            }),
        }
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        match self.decode_claims(token, &self.refresh_decoding_key)? {
            TokenClaims::Refresh(claims) => Ok(claims),
            other => Err(TokenError::InvalidTokenType {
                expected: "refresh",
                actual: other.kind(),
            }),
        }
    }

    /// Access token lifetime as configured (e.g. `15m`), reported to clients as `expiresIn`.
    pub fn access_token_expires_in(&self) -> &str {
        self.access_token_ttl.label()
    }
}

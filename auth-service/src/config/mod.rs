use axum::http::Uri;
use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::config::Environment;
use service_core::error::AppError;
use service_core::resilience::{CircuitBreakerConfig, RetryConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub resilience: ResilienceConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: SecretString,
    /// Falls back to the access secret when unset.
    pub refresh_secret: Option<SecretString>,
    pub access_token_ttl: TokenTtl,
    pub refresh_token_ttl: TokenTtl,
}

/// Token lifetime written as `<n>s`, `<n>m`, `<n>h` or `<n>d`.
///
/// A bare number is taken as seconds. The original text is kept so it can be
/// echoed back to clients as `expiresIn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTtl {
    label: String,
    seconds: i64,
}

impl TokenTtl {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_seconds(&self) -> i64 {
        self.seconds
    }
}

impl FromStr for TokenTtl {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let label = raw.trim();
        let (digits, unit) = match label.find(|c: char| !c.is_ascii_digit()) {
            Some(idx) => label.split_at(idx),
            None => (label, "s"),
        };

        let multiplier = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 60 * 60,
            "d" => 24 * 60 * 60,
            _ => return Err(format!("'{}' has an unknown unit, use s, m, h or d", raw)),
        };

        let amount: i64 = digits
            .parse()
            .map_err(|_| format!("'{}' is not a valid duration", raw))?;
        if amount == 0 {
            return Err("must be positive".to_string());
        }

        let seconds = amount
            .checked_mul(multiplier)
            .ok_or_else(|| format!("'{}' is too large", raw))?;

        Ok(Self {
            label: label.to_string(),
            seconds,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_seconds: 900,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

impl ResilienceConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_failure_threshold(self.failure_threshold)
            .with_reset_timeout(Duration::from_millis(self.reset_timeout_ms))
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        Self::from_lookup(common_config, |key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default);

        let config = AuthConfig {
            common,
            service_name: get("SERVICE_NAME", Some("auth-service"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig {
                url: SecretString::new(get("DATABASE_URL", None)?),
                max_connections: parse_env(&lookup, "DATABASE_MAX_CONNECTIONS", "10")?,
            },
            jwt: JwtConfig {
                access_secret: SecretString::new(get("JWT_ACCESS_SECRET", None)?),
                refresh_secret: lookup("JWT_REFRESH_SECRET")
                    .filter(|v| !v.is_empty())
                    .map(SecretString::new),
                access_token_ttl: parse_ttl(&lookup, "JWT_ACCESS_EXPIRES_IN", "15m")?,
                refresh_token_ttl: parse_ttl(&lookup, "JWT_REFRESH_EXPIRES_IN", "7d")?,
            },
            security: SecurityConfig {
                allowed_origins: get("CORS_ORIGIN", Some("http://localhost:8080"))?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                requests: parse_env(&lookup, "RATE_LIMIT_REQUESTS", "100")?,
                window_seconds: parse_env(&lookup, "RATE_LIMIT_WINDOW_SECONDS", "900")?,
            },
            resilience: ResilienceConfig {
                max_retries: parse_env(&lookup, "DB_RETRY_MAX_RETRIES", "3")?,
                base_delay_ms: parse_env(&lookup, "DB_RETRY_BASE_DELAY_MS", "100")?,
                max_delay_ms: parse_env(&lookup, "DB_RETRY_MAX_DELAY_MS", "5000")?,
                failure_threshold: parse_env(&lookup, "DB_CIRCUIT_FAILURE_THRESHOLD", "5")?,
                reset_timeout_ms: parse_env(&lookup, "DB_CIRCUIT_RESET_TIMEOUT_MS", "60000")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(config_error("PORT", "must be greater than 0"));
        }

        if self.database.url.expose_secret().trim().is_empty() {
            return Err(config_error("DATABASE_URL", "must not be empty"));
        }

        if self.jwt.access_secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(config_error(
                "JWT_ACCESS_SECRET",
                "must be at least 32 characters",
            ));
        }

        if let Some(refresh) = &self.jwt.refresh_secret {
            if refresh.expose_secret().len() < MIN_SECRET_LEN {
                return Err(config_error(
                    "JWT_REFRESH_SECRET",
                    "must be at least 32 characters",
                ));
            }
        }

        if self.database.max_connections == 0 {
            return Err(config_error("DATABASE_MAX_CONNECTIONS", "must be positive"));
        }

        if self.rate_limit.requests == 0 || self.rate_limit.window_seconds == 0 {
            return Err(config_error(
                "RATE_LIMIT_REQUESTS",
                "limit and window must both be positive",
            ));
        }

        if self.resilience.failure_threshold == 0 {
            return Err(config_error("DB_CIRCUIT_FAILURE_THRESHOLD", "must be positive"));
        }

        if self.resilience.base_delay_ms > self.resilience.max_delay_ms {
            return Err(config_error(
                "DB_RETRY_BASE_DELAY_MS",
                "must not exceed DB_RETRY_MAX_DELAY_MS",
            ));
        }

        if self.security.allowed_origins.is_empty() {
            return Err(config_error("CORS_ORIGIN", "at least one origin is required"));
        }

        for origin in &self.security.allowed_origins {
            if !is_http_origin(origin) {
                return Err(config_error(
                    "CORS_ORIGIN",
                    &format!("'{}' is not a valid http(s) URL", origin),
                ));
            }
        }

        Ok(())
    }
}

fn is_http_origin(origin: &str) -> bool {
    match origin.parse::<Uri>() {
        Ok(uri) => {
            matches!(uri.scheme_str(), Some("http") | Some("https")) && uri.host().is_some()
        }
        Err(_) => false,
    }
}

fn config_error(key: &str, reason: &str) -> AppError {
    AppError::ConfigError(anyhow::anyhow!("Invalid environment variables: {}: {}", key, reason))
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(config_error(key, "is required but not set")),
        },
    }
}

fn parse_env<T, F>(lookup: &F, key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = get_env(lookup, key, Some(default))?;
    raw.trim()
        .parse()
        .map_err(|_| config_error(key, &format!("'{}' is not a valid number", raw)))
}

fn parse_ttl<F>(lookup: &F, key: &str, default: &str) -> Result<TokenTtl, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    get_env(lookup, key, Some(default))?
        .parse()
        .map_err(|reason: String| config_error(key, &reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(vars: &[(&str, &str)]) -> Result<AuthConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_lookup(core_config::Config::default(), |key| vars.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_URL", "postgres://localhost/auth"),
            ("JWT_ACCESS_SECRET", SECRET),
        ]
    }

    #[test]
    fn defaults_apply() {
        let config = load(&required()).unwrap();
        assert_eq!(config.jwt.access_token_ttl.label(), "15m");
        assert_eq!(config.jwt.access_token_ttl.as_seconds(), 900);
        assert_eq!(config.jwt.refresh_token_ttl.label(), "7d");
        assert_eq!(config.jwt.refresh_token_ttl.as_seconds(), 7 * 24 * 3600);
        assert!(config.jwt.refresh_secret.is_none());
        assert_eq!(config.rate_limit.requests, 100);
        assert_eq!(config.rate_limit.window_seconds, 900);
        assert_eq!(config.resilience.max_retries, 3);
        assert_eq!(config.resilience.reset_timeout_ms, 60_000);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.security.allowed_origins, vec!["http://localhost:8080"]);
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let err = load(&[("JWT_ACCESS_SECRET", SECRET)]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut vars = required();
        vars.push(("JWT_REFRESH_SECRET", "too-short"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("JWT_REFRESH_SECRET"));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let mut vars = required();
        vars.push(("DB_RETRY_MAX_RETRIES", "lots"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("DB_RETRY_MAX_RETRIES"));
    }

    #[test]
    fn token_lifetimes_accept_unit_suffixes() {
        let ttl = |raw: &str| raw.parse::<TokenTtl>().map(|t| t.as_seconds());
        assert_eq!(ttl("30s"), Ok(30));
        assert_eq!(ttl("1h"), Ok(3600));
        assert_eq!(ttl("7d"), Ok(604_800));
        assert_eq!(ttl("120"), Ok(120));
        assert!(ttl("abc").is_err());
        assert!(ttl("0m").is_err());
        assert!(ttl("-5m").is_err());
        assert!(ttl("10w").is_err());
        assert!(ttl("").is_err());
    }

    #[test]
    fn token_lifetimes_come_from_expires_in_keys() {
        let mut vars = required();
        vars.push(("JWT_ACCESS_EXPIRES_IN", "1h"));
        vars.push(("JWT_REFRESH_EXPIRES_IN", "30d"));
        let config = load(&vars).unwrap();
        assert_eq!(config.jwt.access_token_ttl.label(), "1h");
        assert_eq!(config.jwt.refresh_token_ttl.as_seconds(), 30 * 86_400);

        let mut vars = required();
        vars.push(("JWT_ACCESS_EXPIRES_IN", "soon"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("JWT_ACCESS_EXPIRES_IN"));
    }

    #[test]
    fn cors_origins_must_be_urls() {
        let mut vars = required();
        vars.push(("CORS_ORIGIN", "https://app.example.com, not a url"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("CORS_ORIGIN"));

        let mut vars = required();
        vars.push(("CORS_ORIGIN", "https://app.example.com,http://localhost:3000"));
        let config = load(&vars).unwrap();
        assert_eq!(config.security.allowed_origins.len(), 2);
    }

    #[test]
    fn resilience_settings_convert() {
        let config = load(&required()).unwrap();
        let retry = config.resilience.retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        let breaker = config.resilience.circuit_breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(60));
    }
}

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use service_core::config::Environment;
use std::sync::Arc;
use std::time::Instant;

use crate::services::repository::DatabaseHealth;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    /// Whole seconds since the service started.
    pub uptime: u64,
    pub environment: String,
    pub dependencies: HealthDependencies,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDependencies {
    pub db_connected: bool,
    /// Round-trip time of the ping in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_latency: Option<u64>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.dependencies.db_connected
    }
}

#[derive(Clone)]
pub struct HealthService {
    db_health: Arc<dyn DatabaseHealth>,
    environment: Environment,
    started_at: Instant,
}

impl HealthService {
    pub fn new(db_health: Arc<dyn DatabaseHealth>, environment: Environment) -> Self {
        Self {
            db_health,
            environment,
            started_at: Instant::now(),
        }
    }

    pub async fn check(&self) -> HealthReport {
        let ping_start = Instant::now();
        let db_connected = self.db_health.ping().await.is_ok();
        let db_latency = db_connected.then(|| ping_start.elapsed().as_millis() as u64);

        HealthReport {
            status: if db_connected { "healthy" } else { "unhealthy" },
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uptime: self.started_at.elapsed().as_secs(),
            environment: self.environment.as_str().to_string(),
            dependencies: HealthDependencies {
                db_connected,
                db_latency,
            },
        }
    }
}

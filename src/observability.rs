use diesel::prelude::*;
use std::time::SystemTime;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging and tracing
pub fn init_logging() {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }

    info!(
        service = "tubee",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %log_level,
        log_format = %log_format,
        "Logging initialized"
    );
}

/// Process-wide counters exposed on the health endpoints
pub struct Metrics {
    pub start_time: SystemTime,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time
            .elapsed()
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Application health status
#[derive(Clone, Debug, serde::Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub checks: HealthChecks,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct HealthChecks {
    pub database: String,
    pub pending_tasks: usize,
}

impl HealthStatus {
    pub fn check(metrics: &Metrics, pool: &crate::DbPool, pending_tasks: usize) -> Self {
        let database_status = check_database_health(pool);

        let overall_status = if database_status == "healthy" {
            "healthy"
        } else {
            "unhealthy"
        };

        Self {
            status: overall_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: metrics.uptime_seconds(),
            checks: HealthChecks {
                database: database_status,
                pending_tasks,
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Check database connectivity
fn check_database_health(pool: &crate::DbPool) -> String {
    match pool.get() {
        Ok(mut conn) => match diesel::sql_query("SELECT 1").execute(&mut conn) {
            Ok(_) => "healthy".to_string(),
            Err(_) => "unhealthy".to_string(),
        },
        Err(_) => "unhealthy".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::create_test_db;

    #[test]
    fn test_health_check_reports_database() {
        let (_dir, pool) = create_test_db();
        let status = HealthStatus::check(&Metrics::new(), &pool, 3);
        assert!(status.is_healthy());
        assert_eq!(status.checks.database, "healthy");
        assert_eq!(status.checks.pending_tasks, 3);
    }
}

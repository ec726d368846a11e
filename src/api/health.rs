use crate::channels::ChannelService;
use crate::observability::{HealthStatus, Metrics};
use crate::RqDbPool;
use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

fn pending_tasks(service: &ChannelService) -> usize {
    service.orchestrator().queue().pending()
}

/// Health check endpoint for load balancers
#[get("")]
pub async fn health_check(
    pool: RqDbPool,
    metrics: web::Data<Metrics>,
    service: web::Data<ChannelService>,
) -> impl Responder {
    let status = HealthStatus::check(&metrics, &pool, pending_tasks(&service));
    if status.is_healthy() {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}

/// Readiness check: the database must answer
#[get("/ready")]
pub async fn readiness_check(pool: RqDbPool) -> impl Responder {
    match pool.get() {
        Ok(_) => HttpResponse::Ok().json(json!({
            "status": "ready",
            "database": "connected"
        })),
        Err(_) => HttpResponse::ServiceUnavailable().json(json!({
            "status": "not_ready",
            "database": "disconnected"
        })),
    }
}

#[get("/live")]
pub async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus text format
#[get("/metrics")]
pub async fn metrics_endpoint(
    pool: RqDbPool,
    metrics: web::Data<Metrics>,
    service: web::Data<ChannelService>,
) -> impl Responder {
    let db_status = if pool.get().is_ok() { 1 } else { 0 };
    let active_channels = service
        .repository()
        .active_ids()
        .map(|ids| ids.len())
        .unwrap_or(0);

    let prometheus_metrics = format!(
        "# HELP tubee_database_status Database health status (1=healthy, 0=unhealthy)\n\
         # TYPE tubee_database_status gauge\n\
         tubee_database_status {}\n\
         # HELP tubee_uptime_seconds Seconds since startup\n\
         # TYPE tubee_uptime_seconds counter\n\
         tubee_uptime_seconds {}\n\
         # HELP tubee_active_channels Channels with a live hub subscription\n\
         # TYPE tubee_active_channels gauge\n\
         tubee_active_channels {}\n\
         # HELP tubee_pending_tasks Background tasks waiting to run\n\
         # TYPE tubee_pending_tasks gauge\n\
         tubee_pending_tasks {}\n",
        db_status,
        metrics.uptime_seconds(),
        active_channels,
        pending_tasks(&service)
    );

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(prometheus_metrics)
}

pub fn routes() -> actix_web::Scope {
    web::scope("/health")
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check)
        .service(metrics_endpoint)
}

use actix_web::{web, HttpRequest, HttpResponse};
use prometheus::Encoder;

use crate::metrics::REGISTRY;
use crate::state::AppState;
use crate::store::{BalanceStore, CredentialValidator, UsageLog};
use crate::validation::constant_time_eq;

/// GET /health - Liveness probe. Does not touch the store or the upstream.
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "docunexu-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// True when no scrape token is configured, or the request carries it as a bearer token.
fn scrape_allowed(req: &HttpRequest, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics<C, B, U>(req: HttpRequest, state: web::Data<AppState<C, B, U>>) -> HttpResponse
where
    C: 'static,
    B: 'static,
    U: 'static,
{
    if !scrape_allowed(&req, state.config.metrics_token.as_deref()) {
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "unauthorized",
            "message": "Valid Bearer token required for /metrics"
        }));
    }

    let mut buffer = Vec::new();
    if let Err(e) = prometheus::TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return HttpResponse::InternalServerError().body("Failed to encode metrics");
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

pub fn configure<C, B, U>(cfg: &mut web::ServiceConfig)
where
    C: CredentialValidator + 'static,
    B: BalanceStore + 'static,
    U: UsageLog + 'static,
{
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics::<C, B, U>));
}

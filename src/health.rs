use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::counter::CounterState;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub strategy: String,
    pub counter: CounterState,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses((status = 200, description = "Service is running", body = StatusResponse))
)]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(StatusResponse {
        status: "ok".to_string(),
        message: "Invoice service is running".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Liveness with counter state", body = HealthResponse))
)]
pub async fn health(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        strategy: state.pipeline.strategy_name().to_string(),
        counter: state.counter.state(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/health").route(web::get().to(health)));
}

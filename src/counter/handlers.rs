use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::counter::{CounterError, CounterMode};
use crate::invoice::common::format_invoice_number;
use crate::{AppState, ErrorResponse};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NextNumberResponse {
    pub next: u64,
    /// Five-digit rendition, e.g. "00042".
    pub formatted: String,
    pub mode: CounterMode,
}

impl NextNumberResponse {
    fn new(next: u64, mode: CounterMode) -> Self {
        Self {
            next,
            formatted: format_invoice_number(next),
            mode,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommitResponse {
    pub issued: u64,
    pub next: u64,
    pub mode: CounterMode,
}

fn counter_error_response(err: &CounterError) -> HttpResponse {
    log::error!("Invoice counter request failed: {}", err);
    HttpResponse::InternalServerError().json(ErrorResponse::new("CounterFailure", &err.to_string()))
}

#[utoipa::path(
    get,
    path = "/api/counter/next",
    tag = "Counter",
    responses(
        (status = 200, description = "Number the next invoice will carry", body = NextNumberResponse),
        (status = 500, description = "Neither the store nor the local file could be read", body = ErrorResponse)
    )
)]
pub async fn get_next_number(state: web::Data<AppState>) -> impl Responder {
    match state.counter.peek_next().await {
        Ok(reading) => HttpResponse::Ok().json(NextNumberResponse::new(reading.next, reading.mode)),
        Err(e) => counter_error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/counter/commit",
    tag = "Counter",
    responses(
        (status = 200, description = "One number consumed", body = CommitResponse),
        (status = 500, description = "Counter could not be advanced", body = ErrorResponse)
    )
)]
pub async fn commit_number(state: web::Data<AppState>) -> impl Responder {
    match state.counter.commit_next().await {
        Ok(outcome) => HttpResponse::Ok().json(CommitResponse {
            issued: outcome.issued,
            next: outcome.next,
            mode: outcome.mode,
        }),
        Err(e) => counter_error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/counter/reset",
    tag = "Counter",
    responses(
        (status = 200, description = "Counter reset, the next invoice is number 1", body = NextNumberResponse),
        (status = 500, description = "Reset failed", body = ErrorResponse)
    )
)]
pub async fn reset_counter(state: web::Data<AppState>) -> impl Responder {
    match state.counter.reset().await {
        Ok(()) => HttpResponse::Ok().json(NextNumberResponse::new(1, CounterMode::Synced)),
        Err(e) => counter_error_response(&e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/counter/next").route(web::get().to(get_next_number)))
        .service(web::resource("/api/counter/commit").route(web::post().to(commit_number)))
        .service(web::resource("/api/counter/reset").route(web::post().to(reset_counter)));
}

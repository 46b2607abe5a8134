use actix_web::http::header;
use actix_web::{web, HttpResponse, Responder};

use crate::invoice::{GenerateInvoiceRequest, GeneratedDocument, InvoiceError, IssueError};
use crate::{AppState, ErrorResponse};

pub const HEADER_INVOICE_NUMBER: &str = "X-Invoice-Number";
pub const HEADER_COMMITTED_INVOICE_NUMBER: &str = "X-Committed-Invoice-Number";
pub const HEADER_NUMBER_DRIFT: &str = "X-Invoice-Number-Drift";
pub const HEADER_NEXT_INVOICE_NUMBER: &str = "X-Next-Invoice-Number";
pub const HEADER_COUNTER_MODE: &str = "X-Counter-Mode";
pub const HEADER_FALLBACK: &str = "X-Invoice-Fallback";

fn pdf_response(document: GeneratedDocument) -> actix_web::HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder.content_type("application/pdf").insert_header((
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", document.filename),
    ));
    builder
}

pub fn invoice_error_response(err: &InvoiceError) -> HttpResponse {
    if matches!(err, InvoiceError::Validation(_)) {
        log::info!("Rejected invoice request: {}", err);
    } else {
        log::error!("Invoice generation failed: {}", err);
    }
    HttpResponse::build(err.status_code()).json(ErrorResponse::new(err.kind(), &err.to_string()))
}

#[utoipa::path(
    post,
    path = "/generate",
    tag = "Invoices",
    request_body = GenerateInvoiceRequest,
    responses(
        (status = 200, description = "Generated invoice PDF", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 500, description = "Conversion, merge or serialization failure", body = ErrorResponse),
        (status = 503, description = "Template assets unavailable", body = ErrorResponse)
    )
)]
pub async fn generate_invoice(
    state: web::Data<AppState>,
    body: web::Json<GenerateInvoiceRequest>,
) -> impl Responder {
    let draft = match body.into_inner().to_draft() {
        Ok(draft) => draft,
        Err(e) => return invoice_error_response(&e),
    };

    match state.pipeline.generate(&draft).await {
        Ok(mut document) => {
            let pdf = std::mem::take(&mut document.pdf);
            pdf_response(document).body(pdf)
        }
        Err(e) => invoice_error_response(&e),
    }
}

#[utoipa::path(
    post,
    path = "/api/invoices",
    tag = "Invoices",
    request_body = GenerateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice numbered from the counter, generated and committed", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Missing or invalid fields", body = ErrorResponse),
        (status = 500, description = "Generation failed; the counter was not advanced", body = ErrorResponse)
    )
)]
pub async fn issue_invoice(
    state: web::Data<AppState>,
    body: web::Json<GenerateInvoiceRequest>,
) -> impl Responder {
    match state.invoices.issue(body.into_inner()).await {
        Ok(mut issued) => {
            let pdf = std::mem::take(&mut issued.document.pdf);
            let mode = issued.mode();
            let fallback = issued.used_fallback;
            let drift = issued.number_drift();
            let number = issued.invoice_number;
            let commit = issued.commit;

            let mut response = pdf_response(issued.document);
            response
                .insert_header((HEADER_INVOICE_NUMBER, number.to_string()))
                .insert_header((HEADER_COMMITTED_INVOICE_NUMBER, commit.issued.to_string()))
                .insert_header((HEADER_NEXT_INVOICE_NUMBER, commit.next.to_string()))
                .insert_header((HEADER_COUNTER_MODE, mode.as_str()));
            if drift {
                response.insert_header((HEADER_NUMBER_DRIFT, "true"));
            }
            if fallback {
                response.insert_header((HEADER_FALLBACK, "text"));
            }
            response.body(pdf)
        }
        Err(IssueError::Invoice(e)) => invoice_error_response(&e),
        Err(IssueError::Counter(e)) => {
            log::error!("Invoice counter failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::new("CounterFailure", &e.to_string()))
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/generate").route(web::post().to(generate_invoice)))
        .service(web::resource("/api/invoices").route(web::post().to(issue_invoice)));
}

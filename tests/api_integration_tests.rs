//! HTTP surface exercised through `actix_web::test` with in-process state.

mod common;

use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::json;

use invoice_forge::counter::{CounterService, InMemoryCounterStore, LocalCounter};
use invoice_forge::invoice::{AssetLoader, FallbackGenerator, FormGenerator, InvoicePipeline};
use invoice_forge::{configure_routes, AppState, ErrorResponse};

fn state_over(
    pipeline: InvoicePipeline,
    counter: Arc<CounterService>,
) -> web::Data<AppState> {
    web::Data::new(AppState::from_parts(
        counter,
        Arc::new(pipeline),
        Arc::new(AssetLoader::new(reqwest::Client::new())),
        false,
    ))
}

fn state_with(pipeline: InvoicePipeline, dir: &std::path::Path) -> web::Data<AppState> {
    let (counter, _store) = common::counter_service(dir);
    state_over(pipeline, counter)
}

/// Text strategy state plus the store behind its counter.
fn text_state_with_store(dir: &std::path::Path) -> (web::Data<AppState>, Arc<InMemoryCounterStore>) {
    let (counter, store) = common::counter_service(dir);
    (
        state_over(InvoicePipeline::new(Arc::new(FallbackGenerator)), counter),
        store,
    )
}

fn text_state(dir: &std::path::Path) -> web::Data<AppState> {
    state_with(InvoicePipeline::new(Arc::new(FallbackGenerator)), dir)
}

fn generate_body() -> serde_json::Value {
    json!({
        "first_name": "Jane",
        "last_name": "Doe",
        "invoice_number": "00007",
        "issue_date": "2025-03-01",
        "due_date": "2025-03-15",
        "amount": 660
    })
}

#[actix_web::test]
async fn test_generate_returns_pdf_attachment() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(generate_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"invoice-00007.pdf\""
    );
    let body = test::read_body(resp).await;
    assert!(body.starts_with(b"%PDF"));
}

#[actix_web::test]
async fn test_generate_rejects_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(json!({ "first_name": "Jane", "issue_date": "01/03/2025" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "ValidationError");
    assert!(body.message.contains("invoice_number") || body.message.contains("Invoice number"));
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/generate")
        .insert_header(("content-type", "application/json"))
        .set_payload("{ malformed json ")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "ValidationError");
}

#[actix_web::test]
async fn test_missing_template_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = InvoicePipeline::new(Arc::new(FormGenerator::new(
        Arc::new(AssetLoader::new(reqwest::Client::new())),
        "/no/such/form.pdf",
        None,
    )));
    let app = test::init_service(App::new().app_data(state_with(pipeline, dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(generate_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 503);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.error, "TemplateLoadFailure");
}

#[actix_web::test]
async fn test_issue_sets_counter_headers() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    for expected in 1..=2u64 {
        let req = test::TestRequest::post()
            .uri("/api/invoices")
            .set_json(generate_body())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        let headers = resp.headers();
        assert_eq!(headers.get("x-invoice-number").unwrap(), expected.to_string().as_str());
        assert_eq!(
            headers.get("x-next-invoice-number").unwrap(),
            (expected + 1).to_string().as_str()
        );
        assert_eq!(
            headers.get("x-committed-invoice-number").unwrap(),
            expected.to_string().as_str()
        );
        assert_eq!(headers.get("x-counter-mode").unwrap(), "synced");
        assert!(headers.get("x-invoice-number-drift").is_none());
        // The number in the body is ignored in favour of the counter.
        assert_eq!(
            headers.get("content-disposition").unwrap(),
            format!("attachment; filename=\"invoice-{:05}.pdf\"", expected).as_str()
        );
    }
}

#[actix_web::test]
async fn test_counter_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::get().uri("/api/counter/next").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["next"], 1);
    assert_eq!(body["formatted"], "00001");
    assert_eq!(body["mode"], "synced");

    let req = test::TestRequest::post().uri("/api/counter/commit").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["issued"], 1);
    assert_eq!(body["next"], 2);

    let req = test::TestRequest::get().uri("/api/counter/next").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["next"], 2);

    let req = test::TestRequest::post().uri("/api/counter/reset").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["next"], 1);

    let req = test::TestRequest::get().uri("/api/counter/next").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["next"], 1);
}

#[actix_web::test]
async fn test_counter_endpoints_report_degraded_mode() {
    let dir = tempfile::tempdir().unwrap();
    let (state, store) = text_state_with_store(dir.path());
    let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;

    let req = test::TestRequest::post().uri("/api/counter/commit").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["mode"], "synced");

    store.set_offline(true);

    let req = test::TestRequest::get().uri("/api/counter/next").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["next"], 2);
    assert_eq!(body["mode"], "degraded");

    let req = test::TestRequest::post().uri("/api/counter/commit").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["issued"], 2);
    assert_eq!(body["next"], 3);
    assert_eq!(body["mode"], "degraded");

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["counter"], "degraded");
}

#[actix_web::test]
async fn test_issue_while_store_offline_is_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let (state, store) = text_state_with_store(dir.path());
    store.set_offline(true);
    let app = test::init_service(App::new().app_data(state).configure(configure_routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/invoices")
        .set_json(generate_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("x-counter-mode").unwrap(), "degraded");
    assert_eq!(headers.get("x-invoice-number").unwrap(), "1");
    assert_eq!(headers.get("x-committed-invoice-number").unwrap(), "1");
    assert_eq!(headers.get("x-next-invoice-number").unwrap(), "2");
}

#[actix_web::test]
async fn test_issue_reports_number_drift() {
    let dir = tempfile::tempdir().unwrap();
    let (counter, store) = common::counter_service(dir.path());
    let other = Arc::new(CounterService::new(
        store,
        LocalCounter::new(dir.path().join("other.json")),
        "test_counter",
    ));
    let pipeline = InvoicePipeline::new(Arc::new(common::InterleavedCommit::new(other)));
    let app = test::init_service(
        App::new()
            .app_data(state_over(pipeline, counter))
            .configure(configure_routes),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/invoices")
        .set_json(generate_body())
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("x-invoice-number").unwrap(), "1");
    assert_eq!(headers.get("x-committed-invoice-number").unwrap(), "2");
    assert_eq!(headers.get("x-next-invoice-number").unwrap(), "3");
    assert_eq!(headers.get("x-invoice-number-drift").unwrap(), "true");
    assert_eq!(headers.get("x-counter-mode").unwrap(), "synced");
}

#[actix_web::test]
async fn test_health_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(App::new().app_data(text_state(dir.path())).configure(configure_routes)).await;

    let req = test::TestRequest::get().uri("/").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "ok");

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["strategy"], "text");
    assert_eq!(body["counter"], "uninitialized");
    assert!(body["uptime_seconds"].is_u64());
}

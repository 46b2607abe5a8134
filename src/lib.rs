use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{error, http::header, web, App, HttpResponse, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod counter;
pub mod health;
pub mod invoice;
pub mod state;

pub use crate::config::{AppConfig, Strategy};
pub use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Malformed JSON bodies get the same error shape as validation failures.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        log::info!("Rejected malformed request body: {}", message);
        error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(ErrorResponse::new("ValidationError", &message)),
        )
        .into()
    })
}

/// Every route of the service. Shared by `run` and the integration tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .configure(health::config)
        .configure(invoice::handlers::config)
        .configure(counter::handlers::config);
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::health::index,
        crate::health::health,
        crate::invoice::handlers::generate_invoice,
        crate::invoice::handlers::issue_invoice,
        crate::counter::handlers::get_next_number,
        crate::counter::handlers::commit_number,
        crate::counter::handlers::reset_counter
    ),
    components(
        schemas(
            invoice::GenerateInvoiceRequest,
            counter::CounterMode,
            counter::CounterState,
            counter::handlers::NextNumberResponse,
            counter::handlers::CommitResponse,
            health::StatusResponse,
            health::HealthResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Invoices", description = "Invoice PDF generation."),
        (name = "Counter", description = "Invoice number sequence."),
        (name = "Health", description = "Liveness endpoints.")
    )
)]
pub struct ApiDoc;

pub async fn run() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = match AppState::new(&config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!("Failed to initialize application state: {:#}", e);
            std::process::exit(1);
        }
    };

    let mut preload = match config.strategy {
        Strategy::Template => vec![config.template_path.as_str()],
        Strategy::Form => vec![config.form_template_path.as_str()],
        Strategy::Text => Vec::new(),
    };
    if config.strategy != Strategy::Text {
        preload.extend(config.trailing_pages_path.as_deref());
    }
    app_state.assets.preload(&preload).await;

    let prometheus = match PrometheusMetricsBuilder::new("invoice_forge")
        .endpoint("/metrics")
        .build()
    {
        Ok(prometheus) => prometheus,
        Err(e) => {
            log::error!("Failed to create Prometheus metrics middleware: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Starting server at http://{}:{} ({} strategy)",
        config.host,
        config.port,
        app_state.pipeline.strategy_name()
    );

    let allowed_origins = config.allowed_origins.clone();
    HttpServer::new(move || {
        let app_state = app_state.clone();
        let prometheus = prometheus.clone();
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .expose_headers(vec![
                header::CONTENT_DISPOSITION,
                header::HeaderName::from_static("x-invoice-number"),
                header::HeaderName::from_static("x-committed-invoice-number"),
                header::HeaderName::from_static("x-invoice-number-drift"),
                header::HeaderName::from_static("x-next-invoice-number"),
                header::HeaderName::from_static("x-counter-mode"),
                header::HeaderName::from_static("x-invoice-fallback"),
            ])
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus)
            .wrap(cors)
            .app_data(app_state)
            .configure(configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::config::AppConfig;
use crate::counter::{CounterService, CounterStore, InMemoryCounterStore, LocalCounter, PgCounterStore};
use crate::invoice::{AssetLoader, InvoicePipeline, InvoiceService};

#[derive(Clone)]
pub struct AppState {
    pub counter: Arc<CounterService>,
    pub pipeline: Arc<InvoicePipeline>,
    pub invoices: Arc<InvoiceService>,
    pub assets: Arc<AssetLoader>,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(900))
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("invoice-forge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client for template assets")?;
        let assets = Arc::new(AssetLoader::new(http_client));

        let store: Arc<dyn CounterStore> = match &config.database_url {
            Some(url) => {
                let store = PgCounterStore::connect_lazy(url).context("invalid DATABASE_URL")?;
                if let Err(e) = store.ensure_schema().await {
                    log::warn!("Could not prepare invoice_counters table, counter starts degraded: {}", e);
                }
                Arc::new(store)
            }
            None => {
                log::warn!("DATABASE_URL not set, invoice counter is kept in memory for this process");
                Arc::new(InMemoryCounterStore::new())
            }
        };

        let counter = Arc::new(CounterService::new(
            store,
            LocalCounter::new(config.local_counter_path.clone()),
            config.counter_key.clone(),
        ));
        log::info!(
            "Invoice counter '{}' with local fallback at {}",
            counter.key(),
            config.local_counter_path.display()
        );
        let pipeline = Arc::new(InvoicePipeline::from_config(config, assets.clone())?);

        Ok(Self::from_parts(counter, pipeline, assets, config.fallback_to_text))
    }

    pub fn from_parts(
        counter: Arc<CounterService>,
        pipeline: Arc<InvoicePipeline>,
        assets: Arc<AssetLoader>,
        fallback_to_text: bool,
    ) -> Self {
        let invoices = Arc::new(InvoiceService::new(
            pipeline.clone(),
            counter.clone(),
            fallback_to_text,
        ));

        Self {
            counter,
            pipeline,
            invoices,
            assets,
            started_at: Instant::now(),
        }
    }
}

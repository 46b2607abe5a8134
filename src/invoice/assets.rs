//! Template asset loading with an in-process cache.
//!
//! Assets are immutable during a process lifetime, so the first successful
//! read of a location is served to every later request.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use super::InvoiceError;

#[derive(Clone)]
pub struct AssetLoader {
    cache: Cache<String, Arc<Vec<u8>>>,
    http_client: reqwest::Client,
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

impl AssetLoader {
    pub fn new(http_client: reqwest::Client) -> Self {
        let cache = Cache::builder()
            .time_to_idle(Duration::from_secs(6 * 60 * 60))
            .max_capacity(16)
            .build();

        Self { cache, http_client }
    }

    /// Bytes of the asset at `location`, a filesystem path or an http(s) URL.
    pub async fn load(&self, location: &str) -> Result<Arc<Vec<u8>>, InvoiceError> {
        if let Some(bytes) = self.cache.get(location).await {
            return Ok(bytes);
        }

        let bytes = if is_remote(location) {
            self.fetch(location).await?
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|e| InvoiceError::TemplateLoad {
                    asset: location.to_string(),
                    reason: e.to_string(),
                })?
        };

        log::info!("Asset '{}' loaded into cache ({} bytes)", location, bytes.len());
        let bytes = Arc::new(bytes);
        self.cache.insert(location.to_string(), bytes.clone()).await;
        Ok(bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InvoiceError> {
        let load_failure = |reason: String| InvoiceError::TemplateLoad {
            asset: url.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| load_failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(load_failure(format!("HTTP {}", response.status())));
        }

        response
            .bytes()
            .await
            .map(|body| body.to_vec())
            .map_err(|e| load_failure(e.to_string()))
    }

    /// Warm the cache at startup. Failures are logged, not fatal: a missing
    /// asset fails the requests that need it.
    pub async fn preload(&self, locations: &[&str]) {
        for location in locations {
            if let Err(e) = self.load(location).await {
                log::error!("Failed to preload asset: {}", e);
            }
        }
    }
}

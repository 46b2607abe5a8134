//! Strategy selection for the assembly pipeline.

use std::sync::Arc;

use crate::config::{AppConfig, ConfigError, Strategy};

use super::assets::AssetLoader;
use super::engine::ConversionEngine;
use super::fallback::FallbackGenerator;
use super::form::FormGenerator;
use super::template::TemplateGenerator;
use super::traits::Generator;
use super::{GeneratedDocument, InvoiceDraft, InvoiceError};

#[derive(Clone)]
pub struct InvoicePipeline {
    primary: Arc<dyn Generator>,
    fallback: FallbackGenerator,
}

impl InvoicePipeline {
    pub fn new(primary: Arc<dyn Generator>) -> Self {
        Self {
            primary,
            fallback: FallbackGenerator,
        }
    }

    pub fn from_config(config: &AppConfig, assets: Arc<AssetLoader>) -> Result<Self, ConfigError> {
        let primary: Arc<dyn Generator> = match config.strategy {
            Strategy::Template => {
                let trailing = config.trailing_pages_path.clone().ok_or(ConfigError::Missing {
                    key: "TRAILING_PAGES_PATH",
                    strategy: "template",
                })?;
                Arc::new(TemplateGenerator::new(
                    assets,
                    ConversionEngine::new(&config.converter),
                    config.template_path.clone(),
                    trailing,
                ))
            }
            Strategy::Form => Arc::new(FormGenerator::new(
                assets,
                config.form_template_path.clone(),
                config.trailing_pages_path.clone(),
            )),
            Strategy::Text => Arc::new(FallbackGenerator),
        };
        Ok(Self::new(primary))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.primary.name()
    }

    /// Run the configured strategy. Failures are returned as-is.
    pub async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError> {
        let document = self.primary.generate(draft).await?;
        log::info!(
            "Generated {} with the {} strategy ({} pages)",
            document.filename,
            self.primary.name(),
            document.page_count
        );
        Ok(document)
    }

    /// The last-resort text-only rendition of `draft`.
    pub async fn generate_text_fallback(
        &self,
        draft: &InvoiceDraft,
    ) -> Result<GeneratedDocument, InvoiceError> {
        self.fallback.generate(draft).await
    }
}

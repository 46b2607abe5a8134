//! Strategy A: merge fields into a text template, convert it to PDF with an
//! external program, then put its first page in front of the trailing pages.
//!
//! Merge fields are written `{{name}}` and must not be split by markup. Names
//! without a value are replaced by the empty string.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

use super::assets::AssetLoader;
use super::common::{escape_typst_string, escape_xml};
use super::engine::{ConversionEngine, ConverterKind};
use super::merge;
use super::traits::Generator;
use super::{GeneratedDocument, InvoiceDraft, InvoiceError};

lazy_static! {
    static ref MERGE_FIELD: Regex =
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("merge field pattern");
}

/// Values available to templates, keyed by merge field name.
pub fn merge_values(draft: &InvoiceDraft) -> HashMap<&'static str, String> {
    HashMap::from([
        ("first_name", draft.first_name.clone()),
        ("last_name", draft.last_name.clone()),
        ("customer_name", draft.customer_name.clone()),
        ("address", draft.address.clone()),
        ("invoice_number", draft.formatted_number()),
        ("issue_date", draft.issue_date.format("%Y-%m-%d").to_string()),
        ("due_date", draft.due_date.format("%Y-%m-%d").to_string()),
        ("amount", draft.amount.clone()),
        ("amount_display", draft.amount_display()),
        ("payment_method", draft.payment_method.clone()),
    ])
}

/// Replace every merge field in `template`, escaping values with `escape`.
pub fn render_merge_fields(
    template: &str,
    values: &HashMap<&'static str, String>,
    escape: fn(&str) -> String,
) -> String {
    MERGE_FIELD
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => escape(value),
            None => {
                log::debug!("Merge field '{}' has no value, leaving it empty", &caps[1]);
                String::new()
            }
        })
        .into_owned()
}

fn escaper(kind: ConverterKind) -> fn(&str) -> String {
    match kind {
        ConverterKind::Soffice => escape_xml,
        ConverterKind::Typst => escape_typst_string,
    }
}

pub struct TemplateGenerator {
    assets: Arc<AssetLoader>,
    engine: ConversionEngine,
    template_location: String,
    trailing_location: String,
}

impl TemplateGenerator {
    pub fn new(
        assets: Arc<AssetLoader>,
        engine: ConversionEngine,
        template_location: impl Into<String>,
        trailing_location: impl Into<String>,
    ) -> Self {
        Self {
            assets,
            engine,
            template_location: template_location.into(),
            trailing_location: trailing_location.into(),
        }
    }

    async fn render_source(&self, draft: &InvoiceDraft) -> Result<String, InvoiceError> {
        let template = self.assets.load(&self.template_location).await?;
        let template =
            std::str::from_utf8(&template).map_err(|e| InvoiceError::TemplateLoad {
                asset: self.template_location.clone(),
                reason: format!("template is not valid UTF-8: {e}"),
            })?;

        Ok(render_merge_fields(
            template,
            &merge_values(draft),
            escaper(self.engine.kind()),
        ))
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &'static str {
        "template"
    }

    async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError> {
        let source = self.render_source(draft).await?;
        let first_page = self.engine.convert(source.as_bytes()).await?;
        let trailing = self.assets.load(&self.trailing_location).await?;

        let (pdf, page_count) = tokio::task::spawn_blocking(move || {
            let converted = merge::load(&first_page)?;
            let trailing = merge::load(&trailing)?;
            let document = merge::assemble(converted, Some(trailing))?;
            let page_count = merge::page_count(&document);
            Ok::<_, InvoiceError>((merge::save(document)?, page_count))
        })
        .await
        .map_err(InvoiceError::merge)??;

        Ok(GeneratedDocument {
            filename: draft.filename(),
            pdf,
            page_count,
        })
    }
}

//! Invoice assembly - turns a draft plus template assets into a PDF.
//!
//! Generators:
//! - `TemplateGenerator` - merge fields into a text template, convert it with
//!   an external process, then append the trailing pages
//! - `FormGenerator` - fill the named fields of a PDF form and lock them
//! - `FallbackGenerator` - single text-only page built from the draft

pub mod assets;
pub mod common;
pub mod draft;
pub mod engine;
pub mod fallback;
pub mod form;
pub mod handlers;
pub mod merge;
pub mod pipeline;
pub mod service;
pub mod template;
pub mod traits;
pub mod validation;

pub use assets::AssetLoader;
pub use draft::{GenerateInvoiceRequest, InvoiceDraft};
pub use engine::{ConversionEngine, ConversionError, ConverterKind};
pub use fallback::FallbackGenerator;
pub use form::{FormGenerator, PdfForm};
pub use pipeline::InvoicePipeline;
pub use service::{InvoiceService, IssueError, IssuedInvoice};
pub use template::TemplateGenerator;
pub use traits::{Generator, Validator};

use actix_web::http::StatusCode;
use thiserror::Error;

/// Failure kinds of the assembly pipeline. None of them is retried here.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to load template asset '{asset}': {reason}")]
    TemplateLoad { asset: String, reason: String },
    #[error("field '{field}' cannot be filled: {reason}")]
    FieldFill { field: String, reason: String },
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    #[error("failed to merge PDF pages: {0}")]
    Merge(String),
    #[error("failed to serialize PDF: {0}")]
    Serialization(String),
}

impl InvoiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            InvoiceError::Validation(_) => "ValidationError",
            InvoiceError::TemplateLoad { .. } => "TemplateLoadFailure",
            InvoiceError::FieldFill { .. } => "FieldFillFailure",
            InvoiceError::Conversion(_) => "ConversionFailure",
            InvoiceError::Merge(_) => "MergeFailure",
            InvoiceError::Serialization(_) => "SerializationFailure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            InvoiceError::Validation(_) => StatusCode::BAD_REQUEST,
            InvoiceError::TemplateLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a last-resort text PDF may stand in for this failure.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, InvoiceError::Validation(_))
    }

    pub(crate) fn merge(e: impl std::fmt::Display) -> Self {
        InvoiceError::Merge(e.to_string())
    }

    pub(crate) fn serialization(e: impl std::fmt::Display) -> Self {
        InvoiceError::Serialization(e.to_string())
    }
}

/// Result of a successful generation. The service keeps no copy.
#[derive(Debug)]
pub struct GeneratedDocument {
    pub filename: String,
    pub pdf: Vec<u8>,
    pub page_count: usize,
}

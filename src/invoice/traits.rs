//! Traits for generator system standardization.

use async_trait::async_trait;

use super::{GeneratedDocument, InvoiceDraft, InvoiceError};

/// Trait for validating request objects.
pub trait Validator {
    /// Validate the state of the object.
    fn validate(&self) -> Result<(), String>;
}

/// One strategy for turning a draft into a finished PDF.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError>;
}

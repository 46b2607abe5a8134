//! Issue flow: peek the counter, generate, and commit only on success.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::counter::{CommitOutcome, CounterError, CounterMode, CounterService};

use super::draft::GenerateInvoiceRequest;
use super::pipeline::InvoicePipeline;
use super::traits::Validator;
use super::{GeneratedDocument, InvoiceError};

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Invoice(#[from] InvoiceError),
    #[error(transparent)]
    Counter(#[from] CounterError),
}

#[derive(Debug)]
pub struct IssuedInvoice {
    pub document: GeneratedDocument,
    /// Number printed on the document.
    pub invoice_number: u64,
    pub commit: CommitOutcome,
    /// Mode of the initial peek; `commit.mode` may differ.
    pub peek_mode: CounterMode,
    pub used_fallback: bool,
}

impl IssuedInvoice {
    /// The counter consumed a different number than the one printed, e.g.
    /// because another client committed in between.
    pub fn number_drift(&self) -> bool {
        self.commit.issued != self.invoice_number
    }

    pub fn mode(&self) -> CounterMode {
        if self.peek_mode.is_degraded() || self.commit.mode.is_degraded() {
            CounterMode::Degraded
        } else {
            CounterMode::Synced
        }
    }
}

pub struct InvoiceService {
    pipeline: Arc<InvoicePipeline>,
    counter: Arc<CounterService>,
    fallback_to_text: bool,
    /// Held from peek to commit so two issues in this process never render the same number.
    issue_lock: Mutex<()>,
}

impl InvoiceService {
    pub fn new(
        pipeline: Arc<InvoicePipeline>,
        counter: Arc<CounterService>,
        fallback_to_text: bool,
    ) -> Self {
        Self {
            pipeline,
            counter,
            fallback_to_text,
            issue_lock: Mutex::new(()),
        }
    }

    pub async fn issue(&self, request: GenerateInvoiceRequest) -> Result<IssuedInvoice, IssueError> {
        request.validate().map_err(InvoiceError::Validation)?;

        let _guard = self.issue_lock.lock().await;
        let reading = self.counter.peek_next().await?;
        if reading.mode.is_degraded() {
            log::warn!(
                "Issuing invoice {} from the local counter",
                reading.next
            );
        }
        let draft = request.into_draft(reading.next)?;

        let (document, used_fallback) = match self.pipeline.generate(&draft).await {
            Ok(document) => (document, false),
            Err(e) if self.fallback_to_text && e.allows_fallback() => {
                log::warn!(
                    "{} for invoice {}, falling back to text PDF: {}",
                    e.kind(),
                    draft.formatted_number(),
                    e
                );
                match self.pipeline.generate_text_fallback(&draft).await {
                    Ok(document) => (document, true),
                    Err(fallback_error) => {
                        log::error!("Text fallback failed as well: {}", fallback_error);
                        return Err(e.into());
                    }
                }
            }
            Err(e) => return Err(e.into()),
        };

        let commit = self.counter.commit_next().await?;
        let issued = IssuedInvoice {
            document,
            invoice_number: draft.invoice_number,
            commit,
            peek_mode: reading.mode,
            used_fallback,
        };

        if issued.number_drift() {
            log::warn!(
                "Invoice rendered as {} but the counter committed {}",
                draft.formatted_number(),
                commit.issued
            );
        }

        Ok(issued)
    }
}

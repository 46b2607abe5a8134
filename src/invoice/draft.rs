//! Invoice request payload and the validated draft built from it.

use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common::{format_amount, format_invoice_number, invoice_filename};
use super::traits::Validator;
use super::validation::{validate_iso_date, validate_required, ValidationError, ValidationErrors};
use super::InvoiceError;

pub const DEFAULT_PAYMENT_METHOD: &str = "Transfer";

/// Body of `POST /generate` and `POST /api/invoices`.
///
/// Either `customer_name` or at least one of `first_name`/`last_name` must be
/// present. Everything else except the dates and amount may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct GenerateInvoiceRequest {
    #[serde(default)]
    #[schema(example = "Jane")]
    pub first_name: Option<String>,
    #[serde(default)]
    #[schema(example = "Doe")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    #[schema(example = "12 Harbour Street, Springfield")]
    pub address: Option<String>,
    /// Accepts a number or a numeric string such as `"00007"`.
    #[serde(default, deserialize_with = "deserialize_invoice_number")]
    #[schema(example = 7)]
    pub invoice_number: Option<u64>,
    #[serde(default)]
    #[schema(example = "2025-01-31")]
    pub issue_date: Option<String>,
    #[serde(default)]
    #[schema(example = "2025-02-14")]
    pub due_date: Option<String>,
    /// Display string; a JSON number is accepted and kept as written.
    #[serde(default, deserialize_with = "deserialize_amount")]
    #[schema(example = "660")]
    pub amount: Option<String>,
    #[serde(default)]
    #[schema(example = "Transfer")]
    pub payment_method: Option<String>,
}

/// Validated input of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    pub first_name: String,
    pub last_name: String,
    pub customer_name: String,
    pub address: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub amount: String,
    pub payment_method: String,
    pub invoice_number: u64,
}

impl InvoiceDraft {
    pub fn formatted_number(&self) -> String {
        format_invoice_number(self.invoice_number)
    }

    pub fn filename(&self) -> String {
        invoice_filename(self.invoice_number)
    }

    pub fn amount_display(&self) -> String {
        format_amount(&self.amount)
    }
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

impl GenerateInvoiceRequest {
    /// `customer_name` when given, otherwise first and last name joined.
    pub fn resolved_customer_name(&self) -> String {
        let explicit = text(&self.customer_name);
        if !explicit.is_empty() {
            return explicit;
        }

        [text(&self.first_name), text(&self.last_name)]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn collect_errors(&self, errors: &mut ValidationErrors) -> (Option<NaiveDate>, Option<NaiveDate>) {
        if self.resolved_customer_name().is_empty() {
            errors.add(
                ValidationError::empty_field("customer_name", "Customer name")
                    .with_suggestion("Enter the customer's first or last name"),
            );
        }
        let issue_date = validate_iso_date(
            self.issue_date.as_deref(),
            "issue_date",
            "Issue date",
            errors,
        );
        let due_date =
            validate_iso_date(self.due_date.as_deref(), "due_date", "Due date", errors);
        validate_required(&text(&self.amount), "amount", "Amount", errors);
        (issue_date, due_date)
    }

    /// Build a draft carrying `invoice_number`, ignoring the number in the body.
    pub fn into_draft(self, invoice_number: u64) -> Result<InvoiceDraft, InvoiceError> {
        let mut errors = ValidationErrors::new();
        let (issue_date, due_date) = self.collect_errors(&mut errors);

        let (Some(issue_date), Some(due_date)) = (issue_date, due_date) else {
            return Err(InvoiceError::Validation(errors.to_message()));
        };
        errors.into_result().map_err(InvoiceError::Validation)?;

        let payment_method = match text(&self.payment_method) {
            method if method.is_empty() => DEFAULT_PAYMENT_METHOD.to_string(),
            method => method,
        };

        Ok(InvoiceDraft {
            customer_name: self.resolved_customer_name(),
            first_name: text(&self.first_name),
            last_name: text(&self.last_name),
            address: text(&self.address),
            issue_date,
            due_date,
            amount: self.amount.unwrap_or_default().trim().to_string(),
            payment_method,
            invoice_number,
        })
    }

    /// Build a draft from a body that must carry its own invoice number.
    pub fn to_draft(&self) -> Result<InvoiceDraft, InvoiceError> {
        let mut errors = ValidationErrors::new();
        let number = self.invoice_number;
        if number.is_none() {
            errors.add(ValidationError::empty_field("invoice_number", "Invoice number"));
        }
        self.collect_errors(&mut errors);

        match number {
            Some(number) if errors.is_empty() => self.clone().into_draft(number),
            _ => Err(InvoiceError::Validation(errors.to_message())),
        }
    }
}

impl Validator for GenerateInvoiceRequest {
    /// Checks everything except the invoice number, which may come from the counter.
    fn validate(&self) -> Result<(), String> {
        let mut errors = ValidationErrors::new();
        self.collect_errors(&mut errors);
        errors.into_result()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn deserialize_invoice_number<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(number)) => Ok(Some(number)),
        Some(NumberOrText::Text(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid invoice number '{raw}'")))
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountValue {
    Text(String),
    Number(serde_json::Number),
}

fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<AmountValue>::deserialize(deserializer)?.map(|value| match value {
            AmountValue::Text(text) => text,
            AmountValue::Number(number) => number.to_string(),
        }),
    )
}

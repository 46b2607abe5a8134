//! Input validation for invoice requests.
//!
//! Errors are collected rather than short-circuited so the caller sees every
//! problem with a submission at once.

use std::fmt;

use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn empty_field(field: &str, label: &str) -> Self {
        Self::new(field, format!("{} is required", label))
    }

    pub fn invalid_date(field: &str, value: &str) -> Self {
        Self::new(field, format!("'{}' is not a valid date", value))
            .with_suggestion("Use the YYYY-MM-DD format, e.g. 2025-01-31")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn to_message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_result(self) -> Result<(), String> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.to_message())
        }
    }
}

pub fn validate_required(value: &str, field: &str, label: &str, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(ValidationError::empty_field(field, label));
    }
}

/// Parse a required `YYYY-MM-DD` date, recording an error when absent or malformed.
pub fn validate_iso_date(
    value: Option<&str>,
    field: &str,
    label: &str,
    errors: &mut ValidationErrors,
) -> Option<NaiveDate> {
    let trimmed = value.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        errors.add(ValidationError::empty_field(field, label));
        return None;
    }

    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(ValidationError::invalid_date(field, trimmed));
            None
        }
    }
}

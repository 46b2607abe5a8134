//! Environment-driven configuration.
//!
//! Values are read from the process environment after loading an optional
//! `.env` file. Every setting has a default so a bare `cargo run` serves the
//! template strategy against an in-memory counter.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::invoice::engine::ConverterKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} is required for the {strategy} strategy")]
    Missing {
        key: &'static str,
        strategy: &'static str,
    },
}

/// Which assembly strategy `/generate` and the issue flow use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Merge fields into a text template and convert it with an external process.
    Template,
    /// Fill the named text fields of a PDF form.
    Form,
    /// Minimal text-only PDF built from the draft.
    Text,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "template" | "docx" | "convert" => Ok(Strategy::Template),
            "form" | "pdf-form" => Ok(Strategy::Form),
            "text" | "fallback" => Ok(Strategy::Text),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub kind: ConverterKind,
    /// Program invoked for conversion (`soffice`, `typst`, or an absolute path).
    pub program: String,
    /// Parent directory for per-conversion scratch directories; system temp when unset.
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub strategy: Strategy,
    /// Text template with `{{field}}` merge fields (strategy A).
    pub template_path: String,
    /// Fillable PDF (strategy B).
    pub form_template_path: String,
    /// Boilerplate pages appended after the first page. Always set for the
    /// template strategy; `TRAILING_PAGES_PATH=none` leaves the form unextended.
    pub trailing_pages_path: Option<String>,
    pub converter: ConverterConfig,
    /// PostgreSQL connection string; the counter runs on an in-process store when absent.
    pub database_url: Option<String>,
    pub counter_key: String,
    pub local_counter_path: PathBuf,
    /// Retry a failed issue with the text fallback instead of failing the request.
    pub fallback_to_text: bool,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let strategy = parse_var("INVOICE_STRATEGY", Strategy::Template)?;
        let converter_kind = parse_var("CONVERTER", ConverterKind::Soffice)?;
        let converter_program = match converter_kind {
            ConverterKind::Soffice => var_or("LIBREOFFICE_PATH", "soffice"),
            ConverterKind::Typst => var_or("TYPST_PATH", "typst"),
        };
        let template_default = match converter_kind {
            ConverterKind::Soffice => "assets/invoice_template.fodt",
            ConverterKind::Typst => "assets/invoice_template.typ",
        };

        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                ]
            });

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", 10000u16)?,
            strategy,
            template_path: var_or("TEMPLATE_PATH", template_default),
            form_template_path: var_or("FORM_TEMPLATE_PATH", "assets/invoice_form.pdf"),
            trailing_pages_path: trailing_pages_for(strategy, optional_var("TRAILING_PAGES_PATH"))?,
            converter: ConverterConfig {
                kind: converter_kind,
                program: converter_program,
                scratch_dir: optional_var("SCRATCH_DIR").map(PathBuf::from),
            },
            database_url: optional_var("DATABASE_URL"),
            counter_key: var_or("COUNTER_KEY", crate::counter::DEFAULT_COUNTER_KEY),
            local_counter_path: PathBuf::from(var_or(
                "LOCAL_COUNTER_PATH",
                "data/invoice_counter.json",
            )),
            fallback_to_text: parse_bool("FALLBACK_TO_TEXT", true)?,
            allowed_origins,
        })
    }
}

const DEFAULT_TRAILING_PAGES: &str = "assets/trailing_pages.pdf";

/// Resolve `TRAILING_PAGES_PATH` for `strategy`. `none` disables the
/// trailing document, which only the form strategy can do without.
fn trailing_pages_for(strategy: Strategy, raw: Option<String>) -> Result<Option<String>, ConfigError> {
    let disabled = raw
        .as_deref()
        .is_some_and(|value| value.eq_ignore_ascii_case("none"));

    match strategy {
        Strategy::Template if disabled => Err(ConfigError::Missing {
            key: "TRAILING_PAGES_PATH",
            strategy: "template",
        }),
        Strategy::Template => Ok(Some(raw.unwrap_or_else(|| DEFAULT_TRAILING_PAGES.to_string()))),
        Strategy::Form if disabled => Ok(None),
        Strategy::Form => Ok(raw),
        Strategy::Text => Ok(None),
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_string())
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(key) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match optional_var(key) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected a boolean".to_string(),
            }),
        },
        None => Ok(default),
    }
}

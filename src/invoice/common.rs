//! Display formatting shared by the generators.

use chrono::NaiveDate;

/// Invoice numbers are shown left-padded to five digits; wider numbers are
/// shown in full.
pub fn format_invoice_number(number: u64) -> String {
    format!("{number:05}")
}

pub fn invoice_filename(number: u64) -> String {
    format!("invoice-{}.pdf", format_invoice_number(number))
}

/// `DD-MM-YYYY`, the layout printed on the form.
pub fn format_display_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// The amount is an opaque display string; it is not parsed.
pub fn format_amount(amount: &str) -> String {
    format!("${amount}")
}

/// Escape special characters for Typst strings.
pub fn escape_typst_string(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\n', r"\n")
}

/// Escape text for XML character data and attribute values.
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

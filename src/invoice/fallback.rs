//! Strategy C: a one-page text invoice built directly from the draft.
//!
//! Needs no template, trailing pages or external program, so it is the
//! last resort when the other strategies cannot run.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

use super::common::format_display_date;
use super::merge;
use super::traits::Generator;
use super::{GeneratedDocument, InvoiceDraft, InvoiceError};

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const LEFT_MARGIN: i64 = 57;
const TOP_LINE: i64 = 757;

/// Helvetica uses WinAnsi; characters outside Latin-1 are replaced.
fn latin1(text: &str) -> Object {
    let bytes = text
        .chars()
        .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
        .collect();
    Object::String(bytes, StringFormat::Literal)
}

/// Lines printed on the page with their font size and the gap before the next line.
pub fn fallback_lines(draft: &InvoiceDraft) -> Vec<(i64, String, i64)> {
    let mut lines = vec![
        (18, format!("Invoice #{}", draft.formatted_number()), 34),
        (12, format!("Issue Date: {}", format_display_date(draft.issue_date)), 23),
        (12, format!("Due Date: {}", format_display_date(draft.due_date)), 34),
        (12, format!("Bill To: {}", draft.customer_name), 23),
    ];
    if !draft.address.is_empty() {
        lines.push((12, draft.address.clone(), 23));
    }
    lines.push((12, format!("Amount: {}", draft.amount_display()), 51));
    lines.push((12, format!("Payment Method: {}", draft.payment_method), 0));
    lines
}

pub fn render(draft: &InvoiceDraft) -> Result<Document, InvoiceError> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new(
            "Td",
            vec![Object::Integer(LEFT_MARGIN), Object::Integer(TOP_LINE)],
        ),
    ];
    for (size, text, gap) in fallback_lines(draft) {
        operations.push(Operation::new("Tf", vec!["F1".into(), Object::Integer(size)]));
        operations.push(Operation::new("Tj", vec![latin1(&text)]));
        if gap > 0 {
            operations.push(Operation::new(
                "Td",
                vec![Object::Integer(0), Object::Integer(-gap)],
            ));
        }
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations }
        .encode()
        .map_err(InvoiceError::serialization)?;

    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content_id = document.add_object(Stream::new(dictionary! {}, content));
    let page_id = document.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(PAGE_WIDTH),
                Object::Integer(PAGE_HEIGHT),
            ],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.compress();

    Ok(document)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackGenerator;

#[async_trait]
impl Generator for FallbackGenerator {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError> {
        let document = render(draft)?;
        Ok(GeneratedDocument {
            filename: draft.filename(),
            page_count: merge::page_count(&document),
            pdf: merge::save(document)?,
        })
    }
}

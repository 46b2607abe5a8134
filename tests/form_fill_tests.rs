//! Form strategy: filling, locking and merging a PDF form.

mod common;

use std::sync::Arc;

use lopdf::Object;

use invoice_forge::invoice::form::fill_invoice_fields;
use invoice_forge::invoice::{merge, AssetLoader, FormGenerator, Generator, InvoiceError, PdfForm};

fn loader() -> Arc<AssetLoader> {
    Arc::new(AssetLoader::new(reqwest::Client::new()))
}

fn values_by_name(form: &PdfForm, document: &lopdf::Document) -> Vec<(String, String)> {
    form.fields()
        .iter()
        .map(|field| (field.name.clone(), common::field_value(document, field.id)))
        .collect()
}

#[test]
fn test_amount_written_to_all_three_fields() {
    let mut form = PdfForm::from_document(common::invoice_form(&[]));
    let missing = fill_invoice_fields(&mut form, &common::sample_draft(7)).unwrap();
    assert!(missing.is_empty());

    let ids: Vec<_> = ["amount", "subtotal", "total", "invoice_number", "issue_date"]
        .iter()
        .map(|name| form.field(name).unwrap().id)
        .collect();
    let document = form.into_document();

    assert_eq!(common::field_value(&document, ids[0]), "$660");
    assert_eq!(common::field_value(&document, ids[1]), "$660");
    assert_eq!(common::field_value(&document, ids[2]), "$660");
    assert_eq!(common::field_value(&document, ids[3]), "00007");
    assert_eq!(common::field_value(&document, ids[4]), "01-03-2025");
}

#[test]
fn test_missing_field_is_skipped() {
    let mut form = PdfForm::from_document(common::invoice_form(&["address"]));
    assert!(!form.has_field("address"));

    let missing = fill_invoice_fields(&mut form, &common::sample_draft(7)).unwrap();
    assert_eq!(missing, vec!["address"]);
}

#[test]
fn test_wrong_field_type_is_field_fill_failure() {
    let mut fields: Vec<(&str, &str)> = common::INVOICE_FIELDS
        .iter()
        .map(|name| (*name, "Tx"))
        .collect();
    fields.retain(|(name, _)| *name != "payment_method");
    fields.push(("payment_method", "Btn"));

    let mut form = PdfForm::from_document(common::form_pdf(&fields));
    let err = fill_invoice_fields(&mut form, &common::sample_draft(7)).unwrap_err();

    assert!(matches!(err, InvoiceError::FieldFill { ref field, .. } if field == "payment_method"));
    assert_eq!(err.kind(), "FieldFillFailure");
}

#[test]
fn test_filled_field_drops_placeholder_appearance() {
    let mut form = PdfForm::from_document(common::invoice_form(&[]));
    assert!(form.fill_text("client_name", "Zoë Müller").unwrap());
    let id = form.field("client_name").unwrap().id;
    let document = form.into_document();

    let dict = document.get_dictionary(id).unwrap();
    assert!(!dict.has(b"AP"));
    assert_eq!(common::field_value(&document, id), "Zoë Müller");
}

#[test]
fn test_lock_marks_every_field_read_only() {
    let mut form = PdfForm::from_document(common::invoice_form(&[]));
    form.lock_all().unwrap();
    let ids: Vec<_> = form.fields().iter().map(|field| field.id).collect();
    let document = form.into_document();

    for id in ids {
        let flags = document
            .get_dictionary(id)
            .unwrap()
            .get(b"Ff")
            .and_then(Object::as_i64)
            .unwrap();
        assert_eq!(flags & 1, 1);
    }
}

#[tokio::test]
async fn test_form_generator_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let form_path = common::write_fixture(
        dir.path(),
        "form.pdf",
        &common::to_bytes(common::invoice_form(&["address"])),
    );
    let trailing = common::labeled_pdf(&["Terms", "Bank details"]);
    let trailing_texts = common::page_texts(&trailing);
    let trailing_path =
        common::write_fixture(dir.path(), "trailing.pdf", &common::to_bytes(trailing));

    let generator = FormGenerator::new(
        loader(),
        form_path.to_string_lossy(),
        Some(trailing_path.to_string_lossy().to_string()),
    );
    let generated = generator.generate(&common::sample_draft(7)).await.unwrap();

    assert_eq!(generated.filename, "invoice-00007.pdf");
    assert_eq!(generated.page_count, 3);

    let document = merge::load(&generated.pdf).unwrap();
    assert_eq!(&common::page_texts(&document)[1..], trailing_texts.as_slice());

    let form = PdfForm::from_document(document.clone());
    let values = values_by_name(&form, &document);
    assert!(values.contains(&("total".to_string(), "$660".to_string())));
    assert!(values.contains(&("invoice_number".to_string(), "00007".to_string())));
    assert!(values.contains(&("client_name".to_string(), "Jane Doe".to_string())));
}

#[tokio::test]
async fn test_form_generator_without_trailing_pages() {
    let dir = tempfile::tempdir().unwrap();
    let form_path = common::write_fixture(
        dir.path(),
        "form.pdf",
        &common::to_bytes(common::invoice_form(&[])),
    );

    let generator = FormGenerator::new(loader(), form_path.to_string_lossy(), None);
    let generated = generator.generate(&common::sample_draft(3)).await.unwrap();

    assert_eq!(generated.page_count, 1);
    let document = merge::load(&generated.pdf).unwrap();
    assert_eq!(document.get_pages().len(), 1);
}

#[tokio::test]
async fn test_missing_form_template_is_template_load_failure() {
    let generator = FormGenerator::new(loader(), "/no/such/form.pdf", None);
    let err = generator.generate(&common::sample_draft(1)).await.unwrap_err();
    assert!(matches!(err, InvoiceError::TemplateLoad { .. }));
    assert_eq!(err.status_code(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
}

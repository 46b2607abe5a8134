//! Shared fixtures: small PDFs built in memory with lopdf.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use invoice_forge::counter::{CounterService, InMemoryCounterStore, LocalCounter};
use invoice_forge::invoice::{
    FallbackGenerator, GenerateInvoiceRequest, GeneratedDocument, Generator, InvoiceDraft,
    InvoiceError,
};

/// Every field the form strategy fills.
pub const INVOICE_FIELDS: [&str; 9] = [
    "client_name",
    "invoice_number",
    "issue_date",
    "due_date",
    "address",
    "amount",
    "subtotal",
    "total",
    "payment_method",
];

pub fn sample_draft(invoice_number: u64) -> InvoiceDraft {
    InvoiceDraft {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        customer_name: "Jane Doe".to_string(),
        address: "12 Harbour Road".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        amount: "660".to_string(),
        payment_method: "Transfer".to_string(),
        invoice_number,
    }
}

pub fn sample_request() -> GenerateInvoiceRequest {
    GenerateInvoiceRequest {
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        address: Some("12 Harbour Road".to_string()),
        issue_date: Some("2025-03-01".to_string()),
        due_date: Some("2025-03-15".to_string()),
        amount: Some("660".to_string()),
        ..Default::default()
    }
}

pub fn counter_service(dir: &Path) -> (Arc<CounterService>, Arc<InMemoryCounterStore>) {
    let store = Arc::new(InMemoryCounterStore::new());
    let service = CounterService::new(
        store.clone(),
        LocalCounter::new(dir.join("counter.json")),
        "test_counter",
    );
    (Arc::new(service), store)
}

/// Text generator that lets a second counter instance commit while the
/// document is being rendered.
pub struct InterleavedCommit {
    other: Arc<CounterService>,
}

impl InterleavedCommit {
    pub fn new(other: Arc<CounterService>) -> Self {
        Self { other }
    }
}

#[async_trait]
impl Generator for InterleavedCommit {
    fn name(&self) -> &'static str {
        "interleaved"
    }

    async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError> {
        self.other.commit_next().await.unwrap();
        FallbackGenerator.generate(draft).await
    }
}

pub fn to_bytes(mut document: Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    document.save_to(&mut bytes).unwrap();
    bytes
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn text_content(label: &str) -> Vec<u8> {
    Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(label)]),
            Operation::new("ET", vec![]),
        ],
    }
    .encode()
    .unwrap()
}

/// Skeleton with a `Pages` node carrying inherited Resources and MediaBox.
fn skeleton(document: &mut Document, kids: Vec<ObjectId>) -> ObjectId {
    let pages_id = (document.max_id + 1, 0);
    document.max_id += 1;
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => count,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    pages_id
}

fn finish(document: &mut Document, pages_id: ObjectId, page_ids: &[ObjectId], extra: lopdf::Dictionary) {
    for page_id in page_ids {
        if let Ok(page) = document.get_dictionary_mut(*page_id) {
            page.set("Parent", pages_id);
        }
    }
    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    for (key, value) in extra.iter() {
        catalog.set(key.clone(), value.clone());
    }
    let catalog_id = document.add_object(catalog);
    document.trailer.set("Root", catalog_id);
}

/// A document with one text page per label.
pub fn labeled_pdf(labels: &[&str]) -> Document {
    let mut document = Document::with_version("1.5");
    let mut page_ids = Vec::new();
    for label in labels {
        let content_id = document.add_object(Stream::new(dictionary! {}, text_content(label)));
        page_ids.push(document.add_object(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
        }));
    }
    let pages_id = skeleton(&mut document, page_ids.clone());
    finish(&mut document, pages_id, &page_ids, dictionary! {});
    document
}

/// A one-page form whose fields are `(name, field type)` pairs, each with a
/// placeholder appearance stream.
pub fn form_pdf(fields: &[(&str, &str)]) -> Document {
    let mut document = Document::with_version("1.5");
    let page_id = document.new_object_id();

    let mut field_ids = Vec::new();
    for (index, (name, field_type)) in fields.iter().enumerate() {
        let y = 760 - (index as i64) * 30;
        let appearance_id = document.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Form", "BBox" => vec![0.into(), 0.into(), 200.into(), 20.into()] },
            text_content("PLACEHOLDER"),
        ));
        field_ids.push(document.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => Object::Name(field_type.as_bytes().to_vec()),
            "T" => Object::string_literal(*name),
            "V" => Object::string_literal(""),
            "Rect" => vec![72.into(), y.into(), 272.into(), (y + 20).into()],
            "P" => page_id,
            "F" => 4,
            "DA" => Object::string_literal("/F1 10 Tf 0 g"),
            "AP" => dictionary! { "N" => appearance_id },
        }));
    }

    let content_id = document.add_object(Stream::new(dictionary! {}, text_content("Invoice Form")));
    document.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Contents" => content_id,
            "Annots" => field_ids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
        }),
    );

    let acroform_id = document.add_object(dictionary! {
        "Fields" => field_ids.iter().copied().map(Object::Reference).collect::<Vec<_>>(),
        "DA" => Object::string_literal("/F1 10 Tf 0 g"),
    });
    let pages_id = skeleton(&mut document, vec![page_id]);
    finish(
        &mut document,
        pages_id,
        &[page_id],
        dictionary! { "AcroForm" => acroform_id },
    );
    document
}

/// The standard invoice form with every field as text except those in `skip`.
pub fn invoice_form(skip: &[&str]) -> Document {
    let fields: Vec<(&str, &str)> = INVOICE_FIELDS
        .iter()
        .filter(|name| !skip.contains(name))
        .map(|name| (*name, "Tx"))
        .collect();
    form_pdf(&fields)
}

/// Decoded content of every page, in page order.
pub fn page_texts(document: &Document) -> Vec<String> {
    document
        .get_pages()
        .into_values()
        .map(|page_id| String::from_utf8_lossy(&document.get_page_content(page_id).unwrap()).into_owned())
        .collect()
}

pub fn field_value(document: &Document, field_id: ObjectId) -> String {
    let value = document
        .get_dictionary(field_id)
        .unwrap()
        .get(b"V")
        .unwrap()
        .as_str()
        .unwrap();
    invoice_forge::invoice::form::decode_text_string(value)
}

/// Shell script standing in for `soffice`: copies `pdf` to the output name
/// it was asked to produce and keeps a copy of the source it received.
#[cfg(unix)]
pub fn fake_soffice(dir: &Path, pdf: &Path, record: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("fake-soffice.sh");
    let body = format!(
        "#!/bin/sh\n\
         # args: profile --headless --convert-to pdf --outdir DIR INPUT\n\
         outdir=\"$6\"\n\
         input=\"$7\"\n\
         stem=$(basename \"$input\")\n\
         stem=\"${{stem%.*}}\"\n\
         cp \"$input\" \"{record}\"\n\
         cp \"{pdf}\" \"$outdir/$stem.pdf\"\n",
        record = record.display(),
        pdf = pdf.display(),
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

//! Strategy B: fill the text fields of a PDF form.
//!
//! Fields are looked up by fully qualified name. A field missing from the form
//! is skipped with a warning; a field of the wrong type fails the generation.
//! After filling, every field is marked read-only and `NeedAppearances` is set
//! so viewers render the stored values.

use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{Document, Object, ObjectId, StringFormat};

use super::assets::AssetLoader;
use super::common::format_display_date;
use super::merge;
use super::traits::Generator;
use super::{GeneratedDocument, InvoiceDraft, InvoiceError};

pub const FIELD_CLIENT_NAME: &str = "client_name";
pub const FIELD_INVOICE_NUMBER: &str = "invoice_number";
pub const FIELD_ISSUE_DATE: &str = "issue_date";
pub const FIELD_DUE_DATE: &str = "due_date";
pub const FIELD_ADDRESS: &str = "address";
pub const FIELD_AMOUNT: &str = "amount";
pub const FIELD_SUBTOTAL: &str = "subtotal";
pub const FIELD_TOTAL: &str = "total";
pub const FIELD_PAYMENT_METHOD: &str = "payment_method";

/// Field flag bit 1: the field may not be changed by the user.
const FLAG_READ_ONLY: i64 = 1;
const MAX_FIELD_DEPTH: usize = 16;

/// Values written into the form, in fill order.
pub fn form_values(draft: &InvoiceDraft) -> Vec<(&'static str, String)> {
    let amount = draft.amount_display();
    vec![
        (FIELD_CLIENT_NAME, draft.customer_name.clone()),
        (FIELD_INVOICE_NUMBER, draft.formatted_number()),
        (FIELD_ISSUE_DATE, format_display_date(draft.issue_date)),
        (FIELD_DUE_DATE, format_display_date(draft.due_date)),
        (FIELD_ADDRESS, draft.address.clone()),
        (FIELD_AMOUNT, amount.clone()),
        (FIELD_SUBTOTAL, amount.clone()),
        (FIELD_TOTAL, amount),
        (FIELD_PAYMENT_METHOD, draft.payment_method.clone()),
    ]
}

/// A terminal form field.
#[derive(Debug, Clone)]
pub struct FormField {
    pub id: ObjectId,
    pub name: String,
    /// `FT` value, inherited from ancestors when the field omits it.
    pub field_type: Option<Vec<u8>>,
    /// Widget annotations that are separate objects from the field.
    pub widgets: Vec<ObjectId>,
}

impl FormField {
    pub fn is_text(&self) -> bool {
        self.field_type.as_deref() == Some(b"Tx")
    }

    fn type_label(&self) -> String {
        self.field_type
            .as_deref()
            .map(|t| String::from_utf8_lossy(t).into_owned())
            .unwrap_or_else(|| "untyped".to_string())
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise single-byte.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a value as a PDF text string.
pub fn encode_text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn acroform_fields(document: &Document) -> Vec<Object> {
    let Ok(catalog) = document.catalog() else {
        return Vec::new();
    };
    catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|form| resolve(document, form))
        .and_then(|form| form.as_dict().ok())
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|fields| resolve(document, fields))
        .and_then(|fields| fields.as_array().ok())
        .cloned()
        .unwrap_or_default()
}

fn collect_fields(
    document: &Document,
    nodes: &[Object],
    parent_name: Option<&str>,
    parent_type: Option<&[u8]>,
    depth: usize,
    out: &mut Vec<FormField>,
) {
    if depth > MAX_FIELD_DEPTH {
        return;
    }

    for node in nodes {
        let Ok(id) = node.as_reference() else {
            continue;
        };
        let Ok(dict) = document.get_dictionary(id) else {
            continue;
        };

        // Kids without a partial name are widgets of the parent, not fields.
        let Some(partial) = dict
            .get(b"T")
            .ok()
            .and_then(|t| t.as_str().ok())
            .map(decode_text_string)
        else {
            continue;
        };

        let name = match parent_name {
            Some(parent) => format!("{parent}.{partial}"),
            None => partial,
        };
        let field_type = dict
            .get(b"FT")
            .ok()
            .and_then(|t| t.as_name().ok())
            .or(parent_type);

        let kids = dict
            .get(b"Kids")
            .ok()
            .and_then(|kids| resolve(document, kids))
            .and_then(|kids| kids.as_array().ok())
            .cloned()
            .unwrap_or_default();
        let is_named = |kid: &Object| {
            kid.as_reference()
                .ok()
                .and_then(|kid_id| document.get_dictionary(kid_id).ok())
                .is_some_and(|kid| kid.has(b"T"))
        };

        if kids.iter().any(is_named) {
            collect_fields(document, &kids, Some(&name), field_type, depth + 1, out);
        } else {
            out.push(FormField {
                id,
                name,
                field_type: field_type.map(<[u8]>::to_vec),
                widgets: kids.iter().filter_map(|kid| kid.as_reference().ok()).collect(),
            });
        }
    }
}

/// An opened PDF form and the fields discovered in it.
pub struct PdfForm {
    document: Document,
    fields: Vec<FormField>,
}

impl PdfForm {
    pub fn open(bytes: &[u8]) -> Result<Self, InvoiceError> {
        let document = Document::load_mem(bytes).map_err(|e| InvoiceError::TemplateLoad {
            asset: "form template".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_document(document))
    }

    pub fn from_document(document: Document) -> Self {
        let mut fields = Vec::new();
        let roots = acroform_fields(&document);
        collect_fields(&document, &roots, None, None, 0, &mut fields);
        Self { document, fields }
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Set the text of `name`. Returns `false` when the form has no such field.
    pub fn fill_text(&mut self, name: &str, value: &str) -> Result<bool, InvoiceError> {
        let Some(field) = self.field(name).cloned() else {
            return Ok(false);
        };
        if !field.is_text() {
            return Err(InvoiceError::FieldFill {
                field: name.to_string(),
                reason: format!("expected a text field, found {}", field.type_label()),
            });
        }

        let fill_failure = |e: lopdf::Error| InvoiceError::FieldFill {
            field: name.to_string(),
            reason: e.to_string(),
        };

        let dict = self
            .document
            .get_dictionary_mut(field.id)
            .map_err(fill_failure)?;
        dict.set("V", encode_text_string(value));
        // Stale appearance streams would show the template's placeholder text.
        dict.remove(b"AP");

        for widget in &field.widgets {
            if let Ok(widget) = self.document.get_dictionary_mut(*widget) {
                widget.remove(b"AP");
            }
        }

        Ok(true)
    }

    /// Mark every field read-only and ask viewers to regenerate appearances.
    pub fn lock_all(&mut self) -> Result<(), InvoiceError> {
        for field in &self.fields {
            let dict = self
                .document
                .get_dictionary_mut(field.id)
                .map_err(|e| InvoiceError::FieldFill {
                    field: field.name.clone(),
                    reason: e.to_string(),
                })?;
            let flags = dict.get(b"Ff").and_then(Object::as_i64).unwrap_or(0);
            dict.set("Ff", Object::Integer(flags | FLAG_READ_ONLY));
        }

        self.set_need_appearances()
    }

    fn set_need_appearances(&mut self) -> Result<(), InvoiceError> {
        let root_id = self
            .document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(InvoiceError::merge)?;

        let acroform = self
            .document
            .get_dictionary(root_id)
            .map_err(InvoiceError::merge)?
            .get(b"AcroForm")
            .ok()
            .cloned();

        match acroform {
            Some(Object::Reference(form_id)) => {
                if let Ok(form) = self.document.get_dictionary_mut(form_id) {
                    form.set("NeedAppearances", true);
                }
            }
            Some(Object::Dictionary(_)) => {
                let catalog = self
                    .document
                    .get_dictionary_mut(root_id)
                    .map_err(InvoiceError::merge)?;
                if let Ok(form) = catalog
                    .get_mut(b"AcroForm")
                    .and_then(Object::as_dict_mut)
                {
                    form.set("NeedAppearances", true);
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

/// Fill the fixed invoice fields into `form`, skipping the ones it lacks.
/// Returns the names of the skipped fields.
pub fn fill_invoice_fields(
    form: &mut PdfForm,
    draft: &InvoiceDraft,
) -> Result<Vec<&'static str>, InvoiceError> {
    let mut missing = Vec::new();
    for (name, value) in form_values(draft) {
        if !form.fill_text(name, &value)? {
            log::warn!("Form field '{}' not found in template, skipping", name);
            missing.push(name);
        }
    }
    Ok(missing)
}

pub struct FormGenerator {
    assets: Arc<AssetLoader>,
    form_location: String,
    trailing_location: Option<String>,
}

impl FormGenerator {
    pub fn new(
        assets: Arc<AssetLoader>,
        form_location: impl Into<String>,
        trailing_location: Option<String>,
    ) -> Self {
        Self {
            assets,
            form_location: form_location.into(),
            trailing_location,
        }
    }
}

#[async_trait]
impl Generator for FormGenerator {
    fn name(&self) -> &'static str {
        "form"
    }

    async fn generate(&self, draft: &InvoiceDraft) -> Result<GeneratedDocument, InvoiceError> {
        let form_bytes = self.assets.load(&self.form_location).await?;
        let trailing_bytes = match &self.trailing_location {
            Some(location) => Some(self.assets.load(location).await?),
            None => None,
        };

        let draft = draft.clone();
        let filename = draft.filename();
        let (pdf, page_count) = tokio::task::spawn_blocking(move || {
            let mut form = PdfForm::open(&form_bytes)?;
            fill_invoice_fields(&mut form, &draft)?;
            form.lock_all()?;

            let trailing = trailing_bytes
                .as_deref()
                .map(|bytes| merge::load(bytes))
                .transpose()?;
            let document = merge::assemble(form.into_document(), trailing)?;
            let page_count = merge::page_count(&document);
            Ok::<_, InvoiceError>((merge::save(document)?, page_count))
        })
        .await
        .map_err(InvoiceError::serialization)??;

        Ok(GeneratedDocument {
            filename,
            pdf,
            page_count,
        })
    }
}

//! Page assembly: the first page of one document followed by every page of
//! another, as a single new document.

use std::collections::BTreeMap;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use super::InvoiceError;

/// Page attributes a page may inherit from its `Pages` ancestors.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const MAX_TREE_DEPTH: usize = 32;

pub fn load(bytes: &[u8]) -> Result<Document, InvoiceError> {
    Document::load_mem(bytes).map_err(InvoiceError::merge)
}

pub fn page_count(document: &Document) -> usize {
    document.get_pages().len()
}

/// Page dictionary with inherited attributes copied onto it, so it stays
/// complete once detached from its original page tree.
fn detached_page(document: &Document, page_id: ObjectId) -> Result<Dictionary, InvoiceError> {
    let mut page = document
        .get_dictionary(page_id)
        .map_err(InvoiceError::merge)?
        .clone();

    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(parent_id) = parent {
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = document.get_dictionary(parent_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key, value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    if !page.has(b"MediaBox") {
        page.set(
            "MediaBox",
            vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        );
    }

    Ok(page)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|kind| kind.as_name().ok())
}

/// Build a document whose pages are page 0 of `first` followed by all pages
/// of `trailing` in their original order. The catalog of `first` is kept, so
/// a form's `AcroForm` survives.
pub fn assemble(first: Document, trailing: Option<Document>) -> Result<Document, InvoiceError> {
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut catalog: Option<Dictionary> = None;
    let mut version = first.version.clone();

    let sources = std::iter::once((true, first)).chain(trailing.map(|doc| (false, doc)));
    for (is_first, mut document) in sources {
        document.renumber_objects_with(next_id);
        next_id = document.max_id + 1;

        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        let selected: &[ObjectId] = if is_first {
            page_ids.get(..1).unwrap_or_default()
        } else {
            &page_ids
        };
        if selected.is_empty() {
            return Err(InvoiceError::Merge(if is_first {
                "first page document has no pages".to_string()
            } else {
                "trailing pages document has no pages".to_string()
            }));
        }

        for page_id in selected {
            pages.push((*page_id, detached_page(&document, *page_id)?));
        }

        if is_first {
            catalog = document.catalog().ok().cloned();
        } else if document.version > version {
            version = document.version.clone();
        }

        for (object_id, object) in std::mem::take(&mut document.objects) {
            match type_name(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") | Some(b"Outlines")
                | Some(b"Outline") => {}
                _ => {
                    objects.insert(object_id, object);
                }
            }
        }
    }

    let pages_id = (next_id, 0);
    let catalog_id = (next_id + 1, 0);

    let mut output = Document::with_version(version);
    output.objects = objects;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = kids.len() as i64;
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        output.objects.insert(page_id, Object::Dictionary(page));
    }
    output.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(count),
        }),
    );

    let mut catalog = catalog.unwrap_or_default();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", pages_id);
    for stale in [&b"Outlines"[..], b"OpenAction", b"PageLabels", b"StructTreeRoot"] {
        catalog.remove(stale);
    }
    output.objects.insert(catalog_id, Object::Dictionary(catalog));
    output.trailer.set("Root", catalog_id);
    output.max_id = catalog_id.0;

    output.prune_objects();
    output.renumber_objects();
    output.compress();

    Ok(output)
}

pub fn save(mut document: Document) -> Result<Vec<u8>, InvoiceError> {
    let mut bytes = Vec::new();
    document
        .save_to(&mut bytes)
        .map_err(InvoiceError::serialization)?;
    Ok(bytes)
}

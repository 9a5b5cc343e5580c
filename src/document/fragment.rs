//! Self-contained PDF fragments: validation of attachment payloads and
//! page-level concatenation.

use std::collections::HashMap;
use std::sync::Arc;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use crate::error::{BinderError, EmbedError, Result};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// An opaque, complete PDF with a known page count.
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct PdfFragment {
    bytes: Arc<[u8]>,
    pages: usize,
}

impl PdfFragment {
    pub fn new(bytes: Vec<u8>, pages: usize) -> Self {
        Self {
            bytes: bytes.into(),
            pages,
        }
    }

    /// Serialise a document built in memory.
    pub fn from_document(doc: &mut Document) -> std::result::Result<Self, lopdf::Error> {
        let pages = doc.get_pages().len();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(Self::new(bytes, pages))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn pages(&self) -> usize {
        self.pages
    }
}

impl std::fmt::Debug for PdfFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfFragment")
            .field("bytes", &self.bytes.len())
            .field("pages", &self.pages)
            .finish()
    }
}

/// Validate an attachment payload as an embeddable PDF.
///
/// The payload is kept as-is; only its structure and page count are checked.
pub fn embed_document(payload: &[u8]) -> std::result::Result<PdfFragment, EmbedError> {
    if payload.is_empty() {
        return Err(EmbedError::Empty);
    }
    let doc = Document::load_mem(payload).map_err(|e| EmbedError::Malformed(e.to_string()))?;
    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(EmbedError::NoPages);
    }
    Ok(PdfFragment::new(payload.to_vec(), pages))
}

/// Concatenate fragments, in order, into one PDF.
///
/// Pages are copied with every object they reference; attributes inherited
/// from the source page tree are pinned on each copied page.
pub fn merge_fragments(fragments: &[PdfFragment]) -> Result<PdfFragment> {
    if fragments.is_empty() {
        return Err(BinderError::Pdf("nothing to merge".into()));
    }

    let mut target = Document::with_version("1.5");
    let pages_id = target.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for (index, fragment) in fragments.iter().enumerate() {
        let source = Document::load_mem(fragment.bytes())
            .map_err(|e| BinderError::Pdf(format!("fragment #{index} cannot be loaded: {e}")))?;
        let mut copier = PageCopier::new(&source, &mut target);
        for page_id in source.get_pages().into_values() {
            let new_page = copier.copy_page(page_id, pages_id)?;
            kids.push(Object::Reference(new_page));
        }
    }

    let count = kids.len();
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = target.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    target.trailer.set("Root", catalog_id);

    let merged = PdfFragment::from_document(&mut target)
        .map_err(|e| BinderError::Pdf(format!("failed to serialise merged PDF: {e}")))?;
    debug!(
        fragments = fragments.len(),
        pages = merged.pages(),
        bytes = merged.byte_len(),
        "Merged fragments"
    );
    Ok(merged)
}

/// Copies pages from one document into another, sharing objects that
/// several pages reference.
struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    copied: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            copied: HashMap::new(),
        }
    }

    fn copy_page(&mut self, page_id: ObjectId, parent: ObjectId) -> Result<ObjectId> {
        let source = self.source;
        let page = source
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| BinderError::Pdf(format!("page {page_id:?} unreadable: {e}")))?;

        let inherited: Vec<(&[u8], Object)> = INHERITABLE
            .iter()
            .filter(|key| !page.has(key))
            .filter_map(|key| inherited_attribute(source, page, key).map(|v| (*key, v)))
            .map(|(key, value)| (key, self.copy_object(&value)))
            .collect();

        let new_id = match self.copy_reference(page_id) {
            Object::Reference(id) => id,
            _ => return Err(BinderError::Pdf(format!("page {page_id:?} not copied"))),
        };

        if let Ok(Object::Dictionary(dict)) = self.target.get_object_mut(new_id) {
            for (key, value) in inherited {
                dict.set(key.to_vec(), value);
            }
            dict.set("Parent", Object::Reference(parent));
        }
        Ok(new_id)
    }

    /// Copy the object behind a reference once and return the new reference.
    fn copy_reference(&mut self, id: ObjectId) -> Object {
        if let Some(new_id) = self.copied.get(&id) {
            return Object::Reference(*new_id);
        }
        let new_id = self.target.new_object_id();
        self.copied.insert(id, new_id);

        let source = self.source;
        let copy = match source.get_object(id) {
            Ok(object) => self.copy_object(object),
            Err(err) => {
                warn!(?id, %err, "Cannot resolve reference, using Null");
                Object::Null
            }
        };
        self.target.objects.insert(new_id, copy);
        Object::Reference(new_id)
    }

    fn copy_object(&mut self, object: &Object) -> Object {
        match object {
            Object::Reference(id) => self.copy_reference(*id),
            Object::Dictionary(dict) => Object::Dictionary(self.copy_dict(dict)),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.copy_object(item)).collect())
            }
            Object::Stream(stream) => {
                let dict = self.copy_dict(&stream.dict);
                Object::Stream(lopdf::Stream::new(dict, stream.content.clone()))
            }
            other => other.clone(),
        }
    }

    /// `/Parent` links are dropped; the page tree is rebuilt by the caller.
    fn copy_dict(&mut self, dict: &Dictionary) -> Dictionary {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.copy_object(value));
        }
        copy
    }
}

/// Walk up the page tree looking for an inherited attribute.
fn inherited_attribute(source: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut node = page;
    for _ in 0..32 {
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = source.get_object(parent_id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};

    /// A minimal PDF with `pages` pages; `marker` varies the content bytes.
    pub(crate) fn sample_pdf(pages: usize, marker: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let mut kids = Vec::new();
        for n in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{marker} page {n}"))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(lopdf::Stream::new(
                dictionary! {},
                content.encode().expect("encode content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save sample");
        bytes
    }

    #[test]
    fn test_embed_valid_pdf() {
        let fragment = embed_document(&sample_pdf(3, "a")).expect("embed");
        assert_eq!(fragment.pages(), 3);
        assert!(fragment.byte_len() > 0);
    }

    #[test]
    fn test_embed_rejects_empty_and_garbage() {
        assert_eq!(embed_document(b""), Err(EmbedError::Empty));
        assert!(matches!(
            embed_document(b"this is not a pdf at all"),
            Err(EmbedError::Malformed(_))
        ));
    }

    #[test]
    fn test_embed_rejects_pageless_pdf() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("save");
        assert_eq!(embed_document(&bytes), Err(EmbedError::NoPages));
    }

    #[test]
    fn test_merge_keeps_order_and_inherited_attributes() {
        let a = embed_document(&sample_pdf(2, "first")).expect("a");
        let b = embed_document(&sample_pdf(1, "second")).expect("b");
        let merged = merge_fragments(&[a, b]).expect("merge");
        assert_eq!(merged.pages(), 3);

        let doc = Document::load_mem(merged.bytes()).expect("reload");
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        for page_id in pages.values() {
            let page = doc
                .get_object(*page_id)
                .and_then(Object::as_dict)
                .expect("page dict");
            assert!(page.has(b"MediaBox"));
            assert!(page.has(b"Resources"));
        }
        let last_contents = doc
            .get_object(pages[&3])
            .and_then(Object::as_dict)
            .and_then(|page| page.get(b"Contents"))
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_object(id))
            .and_then(Object::as_stream)
            .expect("contents stream");
        assert!(last_contents
            .content
            .windows(6)
            .any(|w| w == b"second"));
    }

    #[test]
    fn test_merge_nothing_is_an_error() {
        assert!(matches!(merge_fragments(&[]), Err(BinderError::Pdf(_))));
    }
}

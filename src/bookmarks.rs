//! Outline (bookmark) construction built on top of `lopdf`.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

/// Errors that can occur while embedding bookmarks into an assembled PDF document.
#[derive(Debug)]
pub enum BookmarkError {
    /// A required catalog entry was missing from the document trailer.
    MissingCatalog,
    /// The catalog object was not a dictionary, preventing outline injection.
    InvalidCatalog,
    /// A referenced page number did not exist in the assembled document.
    MissingPage {
        /// Index of the entry whose page reference is missing.
        entry_index: usize,
        /// The requested (1-indexed) page number that could not be resolved.
        page_number: usize,
    },
}

impl std::fmt::Display for BookmarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCatalog => write!(f, "PDF catalog entry is missing"),
            Self::InvalidCatalog => write!(f, "PDF catalog entry is not a dictionary"),
            Self::MissingPage {
                entry_index,
                page_number,
            } => write!(
                f,
                "Bookmark {} refers to missing page {}",
                entry_index, page_number
            ),
        }
    }
}

impl std::error::Error for BookmarkError {}

/// A bookmark title and the 1-indexed page it opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bookmark {
    /// Outline title, used verbatim.
    pub title: String,
    /// Target page of the final document.
    pub page_number: usize,
}

/// Applies a flat outline tree to `document`.
///
/// Every bookmark gets a `/Dest [page /Fit]` entry targeting its page, and the catalog is set
/// to open with the outline panel visible.
pub fn apply_bookmarks(document: &mut Document, bookmarks: &[Bookmark]) -> Result<(), BookmarkError> {
    let pages = document.get_pages();
    let mut outline_entries = collect_outline_entries(document, bookmarks, &pages)?;

    if outline_entries.is_empty() {
        return Ok(());
    }

    let outlines_id = document.new_object_id();
    link_outline_entries(outlines_id, document, &mut outline_entries);

    insert_outlines_root(outlines_id, document, &outline_entries)
}

/// Encodes `text` as a PDF text string, falling back to UTF-16BE for non-ASCII text.
pub fn text_string(text: &str) -> Object {
    if text.chars().all(|ch| ch.is_ascii() && !ch.is_ascii_control()) {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xfe, 0xff];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Explicit destination showing the whole page.
pub fn fit_destination(page_ref: ObjectId) -> Object {
    Object::Array(vec![
        Object::Reference(page_ref),
        Object::Name("Fit".into()),
    ])
}

struct OutlineEntry {
    object_id: ObjectId,
    page_ref: ObjectId,
    title: String,
}

fn collect_outline_entries(
    document: &mut Document,
    bookmarks: &[Bookmark],
    pages: &BTreeMap<u32, ObjectId>,
) -> Result<Vec<OutlineEntry>, BookmarkError> {
    let mut entries = Vec::new();

    for (index, bookmark) in bookmarks.iter().enumerate() {
        let page_ref = u32::try_from(bookmark.page_number)
            .ok()
            .and_then(|number| pages.get(&number))
            .copied()
            .ok_or(BookmarkError::MissingPage {
                entry_index: index,
                page_number: bookmark.page_number,
            })?;

        entries.push(OutlineEntry {
            object_id: document.new_object_id(),
            page_ref,
            title: bookmark.title.clone(),
        });
    }

    Ok(entries)
}

fn link_outline_entries(
    outlines_id: ObjectId,
    document: &mut Document,
    entries: &mut [OutlineEntry],
) {
    for index in 0..entries.len() {
        let mut dictionary = Dictionary::new();
        dictionary.set("Title", text_string(&entries[index].title));
        dictionary.set("Dest", fit_destination(entries[index].page_ref));
        dictionary.set("Parent", Object::Reference(outlines_id));

        if index > 0 {
            dictionary.set("Prev", Object::Reference(entries[index - 1].object_id));
        }

        if index + 1 < entries.len() {
            dictionary.set("Next", Object::Reference(entries[index + 1].object_id));
        }

        document
            .objects
            .insert(entries[index].object_id, Object::Dictionary(dictionary));
    }
}

fn insert_outlines_root(
    outlines_id: ObjectId,
    document: &mut Document,
    entries: &[OutlineEntry],
) -> Result<(), BookmarkError> {
    let catalog_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| BookmarkError::MissingCatalog)?;

    let mut dictionary = Dictionary::new();
    dictionary.set("Type", Object::Name("Outlines".into()));
    dictionary.set("Count", Object::Integer(entries.len() as i64));
    if let Some(first) = entries.first() {
        dictionary.set("First", Object::Reference(first.object_id));
    }
    if let Some(last) = entries.last() {
        dictionary.set("Last", Object::Reference(last.object_id));
    }

    let catalog = document
        .objects
        .get_mut(&catalog_id)
        .ok_or(BookmarkError::MissingCatalog)?
        .as_dict_mut()
        .map_err(|_| BookmarkError::InvalidCatalog)?;
    catalog.set("Outlines", Object::Reference(outlines_id));
    catalog.set("PageMode", Object::Name("UseOutlines".into()));

    document
        .objects
        .insert(outlines_id, Object::Dictionary(dictionary));

    Ok(())
}

#[cfg(test)]
mod tests {
    use lopdf::{dictionary, Document, Object, StringFormat};

    use super::{apply_bookmarks, text_string, Bookmark, BookmarkError};

    fn blank_document(pages: usize) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                }))
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn bookmark(title: &str, page_number: usize) -> Bookmark {
        Bookmark {
            title: title.to_string(),
            page_number,
        }
    }

    #[test]
    fn links_entries_in_order() {
        let mut doc = blank_document(4);
        apply_bookmarks(&mut doc, &[bookmark("First", 2), bookmark("Second", 4)])
            .expect("apply bookmarks");

        let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference).unwrap();
        let catalog = doc.get_dictionary(catalog_id).unwrap();
        let outlines_id = catalog.get(b"Outlines").and_then(Object::as_reference).unwrap();
        let outlines = doc.get_dictionary(outlines_id).unwrap();
        assert_eq!(outlines.get(b"Count").and_then(Object::as_i64).unwrap(), 2);

        let first_id = outlines.get(b"First").and_then(Object::as_reference).unwrap();
        let first = doc.get_dictionary(first_id).unwrap();
        let dest = first.get(b"Dest").and_then(Object::as_array).unwrap();
        let page_two = *doc.get_pages().get(&2).unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), page_two);
        assert!(first.get(b"Next").is_ok());
        assert!(first.get(b"Prev").is_err());
    }

    #[test]
    fn missing_page_is_reported() {
        let mut doc = blank_document(1);
        let err = apply_bookmarks(&mut doc, &[bookmark("Nowhere", 3)]).unwrap_err();
        assert!(matches!(
            err,
            BookmarkError::MissingPage {
                entry_index: 0,
                page_number: 3
            }
        ));
    }

    #[test]
    fn non_ascii_titles_use_utf16() {
        match text_string("\u{e9}") {
            Object::String(bytes, StringFormat::Hexadecimal) => {
                assert_eq!(bytes, vec![0xfe, 0xff, 0x00, 0xe9])
            }
            _ => panic!("expected a UTF-16 hex string"),
        }
        assert!(matches!(text_string("Table 1"), Object::String(_, StringFormat::Literal)));
    }
}

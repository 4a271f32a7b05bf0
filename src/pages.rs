//! Page counting and shared access to page attributes of source PDFs.

use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::UnreadablePdfError;

/// Page attributes that may be inherited from ancestor `/Pages` nodes.
pub(crate) const INHERITABLE_ATTRIBUTES: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Parent chains deeper than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

/// Media box used when a page declares none.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Opens a PDF for reading, rejecting encrypted files.
pub fn open_document(path: &Path) -> Result<Document, UnreadablePdfError> {
    let document = Document::load(path).map_err(|source| UnreadablePdfError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(UnreadablePdfError::Encrypted(path.to_path_buf()));
    }
    Ok(document)
}

/// Counts the pages of the PDF at `path`.
pub fn count_pages(path: &Path) -> Result<usize, UnreadablePdfError> {
    let document = open_document(path)?;
    let count = document.get_pages().len();
    log::debug!("{} has {count} page(s)", path.display());
    Ok(count)
}

/// Follows a reference to the object it points at.
pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resolves `object` to a dictionary, following one level of indirection.
pub(crate) fn resolve_dict<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(document, object)?.as_dict().ok()
}

/// Numeric value of an integer or real object.
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Looks up `key` on the page or the nearest ancestor defining it.
pub(crate) fn inherited_attribute<'a>(
    document: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(current).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

/// Media box of a page as `[llx, lly, urx, ury]`.
pub(crate) fn media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(array) = inherited_attribute(document, page_id, b"MediaBox")
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_array().ok())
    else {
        return DEFAULT_MEDIA_BOX;
    };

    let values: Vec<f32> = array
        .iter()
        .filter_map(|value| resolve(document, value).and_then(number))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => [x0.min(*x1), y0.min(*y1), x0.max(*x1), y0.max(*y1)],
        _ => DEFAULT_MEDIA_BOX,
    }
}

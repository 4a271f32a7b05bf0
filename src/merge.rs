//! Assembly of the final package.
//!
//! Source documents are renumbered into one object space, their pages are re-parented under a
//! single page tree behind the TOC pages, and the outline is attached last so that bookmark and
//! TOC targets resolve against the same page list.

use std::collections::BTreeMap;

use lopdf::{dictionary, Document, Object, ObjectId};

use crate::bookmarks::{self, Bookmark};
use crate::error::PackagingError;
use crate::layout::TocPlan;
use crate::pages::{self, INHERITABLE_ATTRIBUTES};
use crate::toc;

/// PDF version of assembled packages.
const OUTPUT_VERSION: &str = "1.5";

/// Merges `sources` behind the TOC pages of `plan` and attaches the outline.
///
/// `sources[i]` must be the document of `plan.entries()[i]`.
pub fn assemble(plan: &TocPlan, sources: Vec<Document>) -> Result<Document, PackagingError> {
    let mut document = Document::with_version(OUTPUT_VERSION);
    let pages_id = document.new_object_id();

    let mut content_pages: Vec<ObjectId> = Vec::new();
    let mut targets: Vec<ObjectId> = Vec::with_capacity(sources.len());
    for source in sources {
        let imported = import_pages(&mut document, source, pages_id);
        if let Some(first) = imported.first() {
            targets.push(*first);
        }
        content_pages.extend(imported);
    }

    let toc_pages = toc::render_toc_pages(&mut document, plan, pages_id, &targets)?;
    let kids: Vec<Object> = toc_pages
        .iter()
        .chain(&content_pages)
        .map(|id| Object::Reference(*id))
        .collect();
    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let bookmarks: Vec<Bookmark> = plan
        .entries()
        .iter()
        .map(|entry| Bookmark {
            title: entry.text.clone(),
            page_number: entry.start_page,
        })
        .collect();
    bookmarks::apply_bookmarks(&mut document, &bookmarks)?;

    document.prune_objects();
    document.compress();
    log::debug!(
        "assembled {} page(s) with {} bookmark(s)",
        count,
        bookmarks.len()
    );
    Ok(document)
}

/// Moves the objects of `source` into `target` and returns its pages in order.
fn import_pages(target: &mut Document, mut source: Document, parent: ObjectId) -> Vec<ObjectId> {
    source.renumber_objects_with(target.max_id + 1);
    target.max_id = target.max_id.max(source.max_id);

    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    let mut page_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    for &page_id in &page_ids {
        let Ok(dict) = source.get_dictionary(page_id) else {
            continue;
        };
        let mut page = dict.clone();
        for key in INHERITABLE_ATTRIBUTES {
            if page.get(key).is_err() {
                if let Some(value) = pages::inherited_attribute(&source, page_id, key) {
                    page.set(key, value.clone());
                }
            }
        }
        page.set("Parent", Object::Reference(parent));
        page_objects.insert(page_id, Object::Dictionary(page));
    }

    for (object_id, object) in source.objects {
        if page_objects.contains_key(&object_id) {
            continue;
        }
        match object.type_name().unwrap_or("") {
            "Catalog" | "Pages" | "Outlines" => {}
            _ => {
                target.objects.insert(object_id, object);
            }
        }
    }
    target.objects.extend(page_objects);

    page_ids
        .into_iter()
        .filter(|id| target.objects.contains_key(id))
        .collect()
}

//! Rendering of TOC pages.
//!
//! Each page is drawn with the standard Helvetica faces: the heading on the first page, then one
//! line per [`TocLine`] with the entry text on the left, a dot leader and the right-aligned page
//! number. Every line carries a link annotation that jumps to the entry's first page.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::bookmarks;
use crate::fonts::{self, BuiltinFont};
use crate::layout::{TocGeometry, TocLine, TocPlan};

/// Descender depth relative to the font size, used for link rectangles.
const DESCENT: f32 = 0.25;

/// Adds the TOC pages of `plan` to `document` and returns their ids in order.
///
/// `targets` holds the first page of every entry; the pages are created with `parent` as their
/// `/Parent` but are not linked into any page tree.
pub fn render_toc_pages(
    document: &mut Document,
    plan: &TocPlan,
    parent: ObjectId,
    targets: &[ObjectId],
) -> Result<Vec<ObjectId>, lopdf::Error> {
    let geometry = plan.geometry();
    let resources_id = document.add_object(font_resources());

    let mut page_ids = Vec::with_capacity(plan.toc_page_count());
    for (page_index, lines) in plan.pages().iter().enumerate() {
        let mut operations = Vec::new();
        if page_index == 0 {
            heading_operations(geometry, &mut operations);
        }

        let mut annotations = Vec::new();
        for (row, line) in lines.iter().enumerate() {
            let baseline = line_baseline(geometry, row);
            line_operations(geometry, line, baseline, &mut operations);
            if let Some(target) = targets.get(line.entry) {
                let annotation = link_annotation(geometry, baseline, *target);
                annotations.push(Object::Reference(document.add_object(annotation)));
            }
        }

        let content = Content { operations };
        let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => parent,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(geometry.page_width),
                Object::Real(geometry.page_height),
            ],
            "Resources" => resources_id,
            "Contents" => content_id,
        };
        if !annotations.is_empty() {
            page.set("Annots", Object::Array(annotations));
        }
        page_ids.push(document.add_object(page));
    }

    log::debug!("rendered {} TOC page(s)", page_ids.len());
    Ok(page_ids)
}

fn font_resources() -> Dictionary {
    let font = |face: BuiltinFont| {
        Object::Dictionary(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => face.base_font(),
            "Encoding" => "WinAnsiEncoding",
        })
    };
    let mut fonts = Dictionary::new();
    for face in [BuiltinFont::Helvetica, BuiltinFont::HelveticaBold] {
        fonts.set(face.resource_name(), font(face));
    }
    dictionary! {
        "Font" => fonts,
        "ProcSet" => vec![Object::Name("PDF".into()), Object::Name("Text".into())],
    }
}

fn line_baseline(geometry: &TocGeometry, row: usize) -> f32 {
    geometry.page_height
        - geometry.top
        - geometry.heading_height
        - geometry.line_height * row as f32
        - geometry.font_size
}

fn encoded(text: &str) -> Object {
    Object::String(fonts::encode_text(text), StringFormat::Literal)
}

fn show_text(
    face: BuiltinFont,
    size: f32,
    x: f32,
    y: f32,
    text: &str,
    operations: &mut Vec<Operation>,
) {
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(face.resource_name().into()), Object::Real(size)],
    ));
    operations.push(Operation::new("Td", vec![Object::Real(x), Object::Real(y)]));
    operations.push(Operation::new("Tj", vec![encoded(text)]));
    operations.push(Operation::new("ET", vec![]));
}

fn heading_operations(geometry: &TocGeometry, operations: &mut Vec<Operation>) {
    if geometry.title.trim().is_empty() {
        return;
    }
    let baseline = geometry.page_height - geometry.top - geometry.heading_size;
    show_text(
        BuiltinFont::HelveticaBold,
        geometry.heading_size,
        geometry.left,
        baseline,
        &geometry.title,
        operations,
    );
}

fn line_operations(
    geometry: &TocGeometry,
    line: &TocLine,
    baseline: f32,
    operations: &mut Vec<Operation>,
) {
    let font = BuiltinFont::Helvetica;
    let size = geometry.font_size;
    show_text(font, size, geometry.left, baseline, &line.text, operations);

    let Some(label) = &line.page_label else {
        return;
    };
    let label_x = geometry.right - font.text_width(label, size);
    show_text(font, size, label_x, baseline, label, operations);

    let gap = geometry.gap();
    let text_end = geometry.left + font.text_width(&line.text, size);
    let leader_width = font.char_width(geometry.leader, size);
    let room = label_x - gap - (text_end + gap);
    if leader_width <= 0.0 || room < leader_width {
        return;
    }
    let count = (room / leader_width).floor() as usize;
    let leader: String = std::iter::repeat(geometry.leader).take(count).collect();
    let leader_x = label_x - gap - count as f32 * leader_width;
    show_text(font, size, leader_x, baseline, &leader, operations);
}

fn link_annotation(geometry: &TocGeometry, baseline: f32, target: ObjectId) -> Dictionary {
    let bottom = baseline - geometry.font_size * DESCENT;
    let top = baseline + geometry.font_size;
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![
            Object::Real(geometry.left),
            Object::Real(bottom),
            Object::Real(geometry.right),
            Object::Real(top),
        ],
        "Border" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(0)],
        "Dest" => bookmarks::fit_destination(target),
    }
}

#[cfg(test)]
mod tests {
    use lopdf::content::Content;
    use lopdf::{Document, Object, ObjectId};

    use super::render_toc_pages;
    use crate::config::{PackagerConfig, TocOverflow};
    use crate::fonts;
    use crate::layout::{plan_toc, TocGeometry, TocSource};

    fn shown_text(doc: &Document, page_id: ObjectId) -> Vec<String> {
        let page = doc.get_dictionary(page_id).unwrap();
        let content_id = page.get(b"Contents").and_then(Object::as_reference).unwrap();
        let stream = doc.get_object(content_id).and_then(Object::as_stream).unwrap();
        let content = Content::decode(&stream.content).unwrap();
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(fonts::decode_bytes(bytes)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn renders_heading_entries_leaders_and_links() {
        let config = PackagerConfig {
            lines_per_page: Some(2),
            toc_title: "Contents".to_string(),
            ..PackagerConfig::default()
        };
        let geometry = TocGeometry::from_config(&config).unwrap();
        let sources = [
            TocSource {
                text: "Table 1: Demographics",
                page_count: Some(2),
            },
            TocSource {
                text: "Listing 2",
                page_count: Some(1),
            },
            TocSource {
                text: "Figure 3",
                page_count: Some(4),
            },
        ];
        let plan = plan_toc(&sources, &geometry, TocOverflow::Truncate).unwrap();
        assert_eq!(plan.toc_page_count(), 2);

        let mut doc = Document::with_version("1.5");
        let parent = doc.new_object_id();
        let targets: Vec<ObjectId> = (0..3).map(|n| (100 + n, 0)).collect();
        let pages = render_toc_pages(&mut doc, &plan, parent, &targets).unwrap();
        assert_eq!(pages.len(), 2);

        let first = shown_text(&doc, pages[0]);
        assert_eq!(first[0], "Contents");
        assert_eq!(first[1], "Table 1: Demographics");
        assert_eq!(first[2], "3");
        assert!(first[3].chars().all(|ch| ch == '.') && first[3].len() > 3);

        let second = shown_text(&doc, pages[1]);
        assert_eq!(second[0], "Figure 3");
        assert_eq!(second[1], "6");

        let page = doc.get_dictionary(pages[1]).unwrap();
        let annots = page.get(b"Annots").and_then(Object::as_array).unwrap();
        assert_eq!(annots.len(), 1);
        let annot_id = annots[0].as_reference().unwrap();
        let annot = doc.get_dictionary(annot_id).unwrap();
        let dest = annot.get(b"Dest").and_then(Object::as_array).unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), targets[2]);
    }
}

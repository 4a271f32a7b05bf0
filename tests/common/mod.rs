#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tlf_packager::convert::DocumentConverter;
use tlf_packager::error::ConversionError;
use tlf_packager::fonts;
use tlf_packager::pipeline::CancelToken;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builds a PDF with `pages` pages and `title` near the top of the first page.
pub fn pdf_document(pages: usize, title: &str) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for number in 0..pages {
        let text = if number == 0 {
            title.to_string()
        } else {
            format!("Page {}", number + 1)
        };
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 760.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
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
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn write_pdf(path: &Path, pages: usize, title: &str) {
    let mut doc = pdf_document(pages, title);
    doc.save(path).expect("save fixture pdf");
}

pub fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|text| format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let file = fs::File::create(path).expect("create docx");
    let mut writer = ZipWriter::new(file);
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .expect("start document part");
    writer
        .write_all(document.as_bytes())
        .expect("write document part");
    writer.finish().expect("finish docx");
}

pub fn write_rtf(path: &Path, title: &str, subtitle: &str) {
    let source = format!(r"{{\rtf1\ansi{{\header\pard {title}\par {subtitle}\par}}\pard Body text\par}}");
    fs::write(path, source).expect("write rtf");
}

/// Converter double producing PDFs with preset page counts.
#[derive(Default)]
pub struct FakeConverter {
    pages: HashMap<String, usize>,
    failing: HashSet<String>,
    unavailable: bool,
    cancel_after_first: Option<CancelToken>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, file_name: &str, pages: usize) -> Self {
        self.pages.insert(file_name.to_string(), pages);
        self
    }

    pub fn failing(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn cancelling(mut self, token: CancelToken) -> Self {
        self.cancel_after_first = Some(token);
        self
    }
}

impl DocumentConverter for FakeConverter {
    fn convert_to_pdf(&self, source: &Path, output_dir: &Path) -> Result<PathBuf, ConversionError> {
        if self.unavailable {
            return Err(ConversionError::Unavailable {
                program: "soffice".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        let name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(ConversionError::Failed {
                path: source.to_path_buf(),
                message: "simulated failure".to_string(),
            });
        }
        let pages = self.pages.get(&name).copied().unwrap_or(1);
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = output_dir.join(format!("{stem}.pdf"));
        write_pdf(&output, pages, &format!("Converted {name}"));
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        Ok(output)
    }
}

/// Outline entries of `doc` as `(title, page number)` pairs in order.
pub fn outline(doc: &Document) -> Vec<(String, u32)> {
    let numbers: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .expect("catalog reference");
    let catalog = doc.get_dictionary(catalog_id).expect("catalog");
    let outlines_id = catalog
        .get(b"Outlines")
        .and_then(Object::as_reference)
        .expect("outline root");
    let outlines = doc.get_dictionary(outlines_id).expect("outline dictionary");

    let mut entries = Vec::new();
    let mut next = outlines.get(b"First").and_then(Object::as_reference).ok();
    while let Some(id) = next {
        let entry = doc.get_dictionary(id).expect("outline entry");
        let title = match entry.get(b"Title").expect("title") {
            Object::String(bytes, _) => text_from_pdf_string(bytes),
            other => panic!("unexpected title {other:?}"),
        };
        let dest = entry.get(b"Dest").and_then(Object::as_array).expect("dest");
        let page = dest[0].as_reference().expect("page reference");
        entries.push((title, numbers[&page]));
        next = entry.get(b"Next").and_then(Object::as_reference).ok();
    }
    entries
}

fn text_from_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xfe, 0xff]) {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Strings shown with `Tj` on page `number` (1-based).
pub fn shown_text(doc: &Document, number: u32) -> Vec<String> {
    let page_id = doc.get_pages()[&number];
    let content = doc.get_page_content(page_id).expect("page content");
    Content::decode(&content)
        .expect("decode content")
        .operations
        .into_iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| match op.operands.first() {
            Some(Object::String(bytes, _)) => Some(fonts::decode_bytes(bytes)),
            _ => None,
        })
        .collect()
}

/// Loads a written package with its streams decompressed.
pub fn load_package(path: &Path) -> Document {
    let mut doc = Document::load(path).expect("load package");
    doc.decompress();
    doc
}

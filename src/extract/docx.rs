//! Title extraction from DOCX packages.
//!
//! Header parts are visited in the order the document's sections reference them, so the
//! title of the first section wins. Body paragraphs (including table cells, in document order)
//! are only consulted when the headers carry no TLF identifier.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::extract::heuristics::{
    self, Anchor, BODY_WINDOW, HEADER_WINDOW, MAX_BODY_CANDIDATE_CHARS,
};
use crate::extract::ExtractError;
use crate::model::TitleParts;

const DOCUMENT_PART: &str = "word/document.xml";
const RELATIONSHIPS_PART: &str = "word/_rels/document.xml.rels";

/// Body paragraphs collected from the main document part.
const BODY_PARAGRAPH_LIMIT: usize = 200;

/// Extracts the title of the DOCX file at `path`.
pub fn extract(path: &Path) -> Result<TitleParts, ExtractError> {
    let file = File::open(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    title_from_reader(file)
}

/// Extracts the title from a DOCX package read from `reader`.
pub fn title_from_reader<R: Read + Seek>(reader: R) -> Result<TitleParts, ExtractError> {
    let mut archive = ZipArchive::new(reader)?;

    let document_xml = read_part(&mut archive, DOCUMENT_PART)?
        .ok_or(ExtractError::MissingPart(DOCUMENT_PART))?;
    let document = parse_paragraphs(&document_xml, BODY_PARAGRAPH_LIMIT)?;

    let mut header_paragraphs = Vec::new();
    for part in header_parts(&mut archive, &document.header_refs)? {
        if let Some(xml) = read_part(&mut archive, &part)? {
            header_paragraphs.extend(parse_paragraphs(&xml, usize::MAX)?.paragraphs);
        }
    }

    Ok(title_from_paragraphs(header_paragraphs, document.paragraphs))
}

/// Applies the DOCX title strategy to header and body paragraphs.
pub fn title_from_paragraphs(header: Vec<String>, body: Vec<String>) -> TitleParts {
    let header = heuristics::without_footer_lines(header);
    if let Some(parts) = heuristics::titled_from_identifier(&header, HEADER_WINDOW, Anchor::Start) {
        return parts;
    }

    let body = heuristics::without_footer_lines(body.into_iter().map(|paragraph| {
        paragraph
            .chars()
            .take(MAX_BODY_CANDIDATE_CHARS)
            .collect::<String>()
    }));
    if let Some(parts) = heuristics::titled_from_identifier(&body, BODY_WINDOW, Anchor::Start) {
        return parts;
    }

    let combined: Vec<String> = header.into_iter().chain(body).collect();
    heuristics::titled_from_candidates(&combined, BODY_WINDOW).unwrap_or_default()
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|source| ExtractError::Io {
            path: name.into(),
            source,
        })?;
    Ok(Some(content))
}

/// Resolves header references to part names, falling back to every `word/headerN.xml` part.
fn header_parts<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    header_refs: &[String],
) -> Result<Vec<String>, ExtractError> {
    let relationships = match read_part(archive, RELATIONSHIPS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let mut parts: Vec<String> = Vec::new();
    for id in header_refs {
        if let Some(target) = relationships.get(id) {
            let name = part_name(target);
            if !parts.contains(&name) {
                parts.push(name);
            }
        }
    }
    if !parts.is_empty() {
        return Ok(parts);
    }

    let mut numbered: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("word/header")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

fn part_name(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("word/{target}"),
    }
}

fn attribute(element: &BytesStart<'_>, local_name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Empty(element) | Event::Start(element)
                if element.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attribute(&element, b"Id"), attribute(&element, b"Target"))
                {
                    relationships.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(relationships)
}

#[derive(Debug, Default)]
struct ParsedPart {
    paragraphs: Vec<String>,
    header_refs: Vec<String>,
}

/// Collects the text of every non-empty paragraph and any header references of a part.
fn parse_paragraphs(xml: &str, limit: usize) -> Result<ParsedPart, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut parsed = ParsedPart::default();
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) => match element.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(element) => match element.local_name().as_ref() {
                b"tab" | b"br" | b"cr" => {
                    if let Some(current) = open.last_mut() {
                        current.push(' ');
                    }
                }
                b"headerReference" => {
                    if let Some(id) = attribute(&element, b"id") {
                        parsed.header_refs.push(id);
                    }
                }
                _ => {}
            },
            Event::Text(text) if in_text => {
                if let Some(current) = open.last_mut() {
                    current.push_str(&text.unescape()?);
                }
            }
            Event::End(element) => match element.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(paragraph) = open.pop() {
                        let paragraph = heuristics::collapse_whitespace(&paragraph);
                        if !paragraph.is_empty() && parsed.paragraphs.len() < limit {
                            parsed.paragraphs.push(paragraph);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(parsed)
}

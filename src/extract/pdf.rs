//! Title extraction from the first page of a PDF.
//!
//! The page content stream is interpreted far enough to know where each piece of text sits and
//! how large it is drawn. Text runs are merged into lines by baseline, and only lines in the top
//! part of the page are considered: the TLF identifier heuristic runs first, and the lines set in
//! the largest font are used when it finds nothing.

use std::collections::HashMap;
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};

use crate::extract::heuristics::{self, Anchor};
use crate::extract::ExtractError;
use crate::fonts::{self, BuiltinFont};
use crate::model::TitleParts;
use crate::pages;

/// Share of the page height, measured from the top, searched for title lines.
const TOP_REGION: f32 = 0.4;

/// Lines of the top region passed to the identifier heuristic.
const LINE_WINDOW: usize = 20;

/// `TJ` adjustments (thousandths of an em) more negative than this read as a word gap.
const WORD_GAP_ADJUSTMENT: f32 = -200.0;

/// Font sizes closer than this are treated as equal.
const SIZE_TOLERANCE: f32 = 0.5;

/// Extracts the title from the first page of the PDF at `path`.
pub fn extract(path: &Path) -> Result<TitleParts, ExtractError> {
    let document = Document::load(path)?;
    if document.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractError::Encrypted);
    }
    title_from_document(&document)
}

/// Extracts the title from the first page of a loaded document.
pub fn title_from_document(document: &Document) -> Result<TitleParts, ExtractError> {
    let Some(page_id) = document.get_pages().values().next().copied() else {
        return Ok(TitleParts::default());
    };

    let [_, bottom, _, top] = pages::media_box(document, page_id);
    let threshold = top - (top - bottom) * TOP_REGION;

    let lines: Vec<TextLine> = first_page_lines(document, page_id)?
        .into_iter()
        .filter(|line| line.baseline >= threshold)
        .filter(|line| !line.text.is_empty() && !heuristics::is_footer_content(&line.text))
        .collect();

    let texts: Vec<String> = lines.iter().map(|line| line.text.clone()).collect();
    if let Some(parts) = heuristics::titled_from_identifier(&texts, LINE_WINDOW, Anchor::Anywhere) {
        return Ok(parts);
    }

    Ok(largest_font_title(&lines))
}

fn largest_font_title(lines: &[TextLine]) -> TitleParts {
    let Some(largest) = lines.iter().map(|line| line.size).reduce(f32::max) else {
        return TitleParts::default();
    };
    let joined = lines
        .iter()
        .filter(|line| largest - line.size < SIZE_TOLERANCE)
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    log::debug!("no identifier on first page; using largest font ({largest}pt) lines");
    TitleParts::single(heuristics::collapse_whitespace(&joined))
}

/// A line of text on the page, top-most first.
#[derive(Debug, Clone, PartialEq)]
struct TextLine {
    baseline: f32,
    size: f32,
    text: String,
}

#[derive(Debug, Clone)]
struct TextRun {
    x: f32,
    y: f32,
    width: f32,
    size: f32,
    text: String,
}

fn first_page_lines(document: &Document, page_id: ObjectId) -> Result<Vec<TextLine>, ExtractError> {
    let fonts = page_fonts(document, page_id);
    let content = Content::decode(&document.get_page_content(page_id)?)?;
    let runs = TextInterpreter::new(&fonts).run(&content.operations);
    Ok(group_lines(runs))
}

/// Merges runs sharing a baseline into lines, ordered from the top of the page.
fn group_lines(mut runs: Vec<TextRun>) -> Vec<TextLine> {
    runs.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut rows: Vec<Vec<TextRun>> = Vec::new();
    for run in runs {
        match rows.last_mut() {
            Some(row)
                if (row[0].y - run.y).abs() <= row[0].size.max(run.size) * 0.3 =>
            {
                row.push(run)
            }
            _ => rows.push(vec![run]),
        }
    }

    rows.into_iter()
        .map(|mut row| {
            row.sort_by(|a, b| a.x.total_cmp(&b.x));
            let mut text = String::new();
            let mut previous_end: Option<f32> = None;
            for run in &row {
                if let Some(end) = previous_end {
                    if run.x - end > run.size * 0.2 {
                        text.push(' ');
                    }
                }
                text.push_str(&run.text);
                previous_end = Some(run.x + run.width);
            }
            TextLine {
                baseline: row[0].y,
                size: row.iter().map(|run| run.size).fold(0.0, f32::max),
                text: heuristics::collapse_whitespace(&text),
            }
        })
        .collect()
}

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translation(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

struct TextInterpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontDecoder>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font: Option<&'a FontDecoder>,
    font_size: f32,
    leading: f32,
    runs: Vec<TextRun>,
}

impl<'a> TextInterpreter<'a> {
    fn new(fonts: &'a HashMap<Vec<u8>, FontDecoder>) -> Self {
        Self {
            fonts,
            ctm: IDENTITY,
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            font: None,
            font_size: 0.0,
            leading: 0.0,
            runs: Vec::new(),
        }
    }

    fn run(mut self, operations: &[Operation]) -> Vec<TextRun> {
        for operation in operations {
            self.apply(operation);
        }
        self.runs
    }

    fn apply(&mut self, operation: &Operation) {
        let operands = &operation.operands;
        let numbers: Vec<f32> = operands.iter().filter_map(pages::number).collect();
        match operation.operator.as_str() {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(matrix) = as_matrix(&numbers) {
                    self.ctm = multiply(&matrix, &self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "Tf" => {
                if let [Object::Name(name), size] = operands.as_slice() {
                    self.font = self.fonts.get(name);
                    self.font_size = pages::number(size).unwrap_or(self.font_size);
                }
            }
            "TL" => {
                if let [leading] = numbers.as_slice() {
                    self.leading = *leading;
                }
            }
            "Td" => {
                if let [tx, ty] = numbers.as_slice() {
                    self.next_line(*tx, *ty);
                }
            }
            "TD" => {
                if let [tx, ty] = numbers.as_slice() {
                    self.leading = -ty;
                    self.next_line(*tx, *ty);
                }
            }
            "Tm" => {
                if let Some(matrix) = as_matrix(&numbers) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line(0.0, -self.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    self.show_array(items);
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show_array(&mut self, items: &[Object]) {
        let start = multiply(&self.text_matrix, &self.ctm);
        let mut text = String::new();
        let mut advance = 0.0;
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let decoded = self.decode(bytes);
                    advance += self.advance(&decoded);
                    text.push_str(&decoded);
                }
                other => {
                    if let Some(adjustment) = pages::number(other) {
                        if adjustment < WORD_GAP_ADJUSTMENT {
                            text.push(' ');
                        }
                        advance -= adjustment / 1000.0 * self.font_size;
                    }
                }
            }
        }
        self.record(start, text, advance);
    }

    fn show(&mut self, bytes: &[u8]) {
        let start = multiply(&self.text_matrix, &self.ctm);
        let text = self.decode(bytes);
        let advance = self.advance(&text);
        self.record(start, text, advance);
    }

    fn decode(&self, bytes: &[u8]) -> String {
        match self.font {
            Some(font) => font.decode(bytes),
            None => fonts::decode_bytes(bytes),
        }
    }

    /// Approximate horizontal advance in text space, using Helvetica metrics.
    fn advance(&self, text: &str) -> f32 {
        BuiltinFont::Helvetica.text_width(text, self.font_size)
    }

    fn record(&mut self, start: Matrix, text: String, advance: f32) {
        self.text_matrix = multiply(&translation(advance, 0.0), &self.text_matrix);
        if text.trim().is_empty() {
            return;
        }
        let scale = (start[2] * start[2] + start[3] * start[3]).sqrt();
        let horizontal = (start[0] * start[0] + start[1] * start[1]).sqrt();
        self.runs.push(TextRun {
            x: start[4],
            y: start[5],
            width: advance * horizontal,
            size: self.font_size * scale,
            text,
        });
    }
}

fn as_matrix(numbers: &[f32]) -> Option<Matrix> {
    match numbers {
        [a, b, c, d, e, f] => Some([*a, *b, *c, *d, *e, *f]),
        _ => None,
    }
}

fn page_fonts(document: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, FontDecoder> {
    let mut decoders = HashMap::new();
    let Some(font_dict) = pages::inherited_attribute(document, page_id, b"Resources")
        .and_then(|resources| pages::resolve_dict(document, resources))
        .and_then(|resources| resources.get(b"Font").ok())
        .and_then(|fonts| pages::resolve_dict(document, fonts))
    else {
        return decoders;
    };

    for (name, font) in font_dict.iter() {
        let Some(font) = pages::resolve_dict(document, font) else {
            continue;
        };
        let composite = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|subtype| subtype == b"Type0")
            .unwrap_or(false);
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|object| pages::resolve(document, object))
            .and_then(|object| object.as_stream().ok())
            .map(|stream| {
                stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone())
            })
            .map(|bytes| ToUnicodeMap::parse(&bytes));

        decoders.insert(name.clone(), FontDecoder::new(composite, to_unicode));
    }
    decoders
}

/// Turns the character codes of one font into text.
#[derive(Debug, Clone)]
struct FontDecoder {
    code_bytes: usize,
    to_unicode: Option<ToUnicodeMap>,
}

impl FontDecoder {
    fn new(composite: bool, to_unicode: Option<ToUnicodeMap>) -> Self {
        let code_bytes = match &to_unicode {
            Some(map) if map.code_bytes > 0 => map.code_bytes,
            _ if composite => 2,
            _ => 1,
        };
        Self {
            code_bytes,
            to_unicode,
        }
    }

    fn decode(&self, bytes: &[u8]) -> String {
        let mut text = String::new();
        for code_bytes in bytes.chunks(self.code_bytes) {
            let code = code_bytes
                .iter()
                .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
            match self.to_unicode.as_ref().and_then(|map| map.get(code)) {
                Some(mapped) => text.push_str(mapped),
                None if self.code_bytes == 1 => text.push(fonts::decode_byte(code_bytes[0])),
                None => {}
            }
        }
        text
    }
}

/// Code to text mapping read from a `/ToUnicode` CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeMap {
    code_bytes: usize,
    mappings: HashMap<u32, String>,
}

/// Ranges larger than this are ignored.
const MAX_RANGE: u32 = 0xFFFF;

#[derive(Debug, PartialEq)]
enum CMapToken {
    Hex(Vec<u8>),
    ArrayStart,
    ArrayEnd,
    Keyword(String),
}

impl ToUnicodeMap {
    /// Parses the `bfchar` and `bfrange` sections of a CMap program.
    pub fn parse(source: &[u8]) -> Self {
        let tokens = cmap_tokens(source);
        let mut map = Self::default();
        let mut index = 0;

        while index < tokens.len() {
            match &tokens[index] {
                CMapToken::Keyword(keyword) if keyword == "begincodespacerange" => {
                    if let Some(CMapToken::Hex(low)) = tokens.get(index + 1) {
                        map.code_bytes = low.len();
                    }
                }
                CMapToken::Keyword(keyword) if keyword == "beginbfchar" => {
                    index += 1;
                    while let (Some(CMapToken::Hex(source)), Some(CMapToken::Hex(target))) =
                        (tokens.get(index), tokens.get(index + 1))
                    {
                        map.note_width(source);
                        map.mappings.insert(code_value(source), utf16_text(target));
                        index += 2;
                    }
                    continue;
                }
                CMapToken::Keyword(keyword) if keyword == "beginbfrange" => {
                    index += 1;
                    index = map.parse_ranges(&tokens, index);
                    continue;
                }
                _ => {}
            }
            index += 1;
        }
        map
    }

    fn parse_ranges(&mut self, tokens: &[CMapToken], mut index: usize) -> usize {
        while let (Some(CMapToken::Hex(low)), Some(CMapToken::Hex(high))) =
            (tokens.get(index), tokens.get(index + 1))
        {
            self.note_width(low);
            let (low_code, high_code) = (code_value(low), code_value(high));
            let valid = high_code >= low_code && high_code - low_code <= MAX_RANGE;
            match tokens.get(index + 2) {
                Some(CMapToken::Hex(target)) => {
                    if valid {
                        let units = utf16_units(target);
                        for offset in 0..=(high_code - low_code) {
                            let mut shifted = units.clone();
                            if let Some(last) = shifted.last_mut() {
                                *last = last.wrapping_add(offset as u16);
                            }
                            self.mappings
                                .insert(low_code + offset, String::from_utf16_lossy(&shifted));
                        }
                    }
                    index += 3;
                }
                Some(CMapToken::ArrayStart) => {
                    index += 3;
                    let mut code = Some(low_code);
                    while let Some(CMapToken::Hex(target)) = tokens.get(index) {
                        if let Some(current) = code.filter(|code| valid && *code <= high_code) {
                            self.mappings.insert(current, utf16_text(target));
                        }
                        code = code.and_then(|code| code.checked_add(1));
                        index += 1;
                    }
                    if let Some(CMapToken::ArrayEnd) = tokens.get(index) {
                        index += 1;
                    }
                }
                _ => break,
            }
        }
        index
    }

    fn note_width(&mut self, code: &[u8]) {
        if self.code_bytes == 0 {
            self.code_bytes = code.len();
        }
    }

    /// Text mapped to `code`, if any.
    pub fn get(&self, code: u32) -> Option<&str> {
        self.mappings.get(&code).map(String::as_str)
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte))
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [high, low] => u16::from_be_bytes([*high, *low]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

fn utf16_text(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn cmap_tokens(source: &[u8]) -> Vec<CMapToken> {
    let mut tokens = Vec::new();
    let mut index = 0;
    while index < source.len() {
        match source[index] {
            b'<' if source.get(index + 1) == Some(&b'<') => index += 2,
            b'>' => index += 1,
            b'<' => {
                let end = source[index..]
                    .iter()
                    .position(|byte| *byte == b'>')
                    .map_or(source.len(), |offset| index + offset);
                let digits: Vec<u8> = source[index + 1..end]
                    .iter()
                    .copied()
                    .filter(u8::is_ascii_hexdigit)
                    .collect();
                let bytes = digits
                    .chunks(2)
                    .map(|pair| {
                        let high = hex_value(pair[0]);
                        let low = pair.get(1).map_or(0, |digit| hex_value(*digit));
                        (high << 4) | low
                    })
                    .collect();
                tokens.push(CMapToken::Hex(bytes));
                index = end + 1;
            }
            b'[' => {
                tokens.push(CMapToken::ArrayStart);
                index += 1;
            }
            b']' => {
                tokens.push(CMapToken::ArrayEnd);
                index += 1;
            }
            b'%' => {
                while index < source.len() && !matches!(source[index], b'\n' | b'\r') {
                    index += 1;
                }
            }
            byte if byte.is_ascii_alphabetic() => {
                let start = index;
                while index < source.len() && source[index].is_ascii_alphanumeric() {
                    index += 1;
                }
                tokens.push(CMapToken::Keyword(
                    String::from_utf8_lossy(&source[start..index]).into_owned(),
                ));
            }
            _ => index += 1,
        }
    }
    tokens
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

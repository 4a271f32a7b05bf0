//! Title extraction from RTF documents.
//!
//! SAS and Word put the titles of an output into the page header (`\header`, `\headerl`,
//! `\headerr`, `\headerf`), frequently laid out as a table with one title per cell. The token
//! stream of [`rtf_parser::lexer::Lexer`] is walked once, keeping header text and a bounded
//! amount of body text apart, decoding escapes to plain text and turning paragraph, line, cell
//! and row marks into line breaks.

use std::fs;
use std::path::Path;

use rtf_parser::lexer::Lexer;
use rtf_parser::tokens::{ControlWord, Property, Token};

use crate::extract::heuristics::{self, Anchor, BODY_WINDOW};
use crate::extract::ExtractError;
use crate::fonts;
use crate::model::TitleParts;

/// Body text kept once a header has been seen; the title never lives deeper than this.
const BODY_CHAR_LIMIT: usize = 16 * 1024;

/// Extracts the title of the RTF file at `path`.
pub fn extract(path: &Path) -> Result<TitleParts, ExtractError> {
    let bytes = fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    title_from_bytes(&bytes)
}

/// Extracts the title from RTF source bytes.
pub fn title_from_bytes(bytes: &[u8]) -> Result<TitleParts, ExtractError> {
    let text = RtfText::parse(bytes)?;
    let header = heuristics::without_footer_lines(text.header_lines());
    if let Some(parts) = heuristics::titled_from_identifier(&header, header.len(), Anchor::Anywhere)
    {
        return Ok(parts);
    }

    let body = heuristics::without_footer_lines(text.body_lines());
    Ok(heuristics::titled_from_identifier(&body, BODY_WINDOW, Anchor::Anywhere).unwrap_or_default())
}

/// A control word reduced to its name and parameter, plus any text the lexer left attached.
#[derive(Debug, PartialEq)]
struct Control<'a> {
    name: &'a str,
    param: Option<i32>,
    trailing: &'a str,
}

impl<'a> Control<'a> {
    fn from_symbol(word: &ControlWord<'a>, property: &Property) -> Self {
        let name = match word {
            ControlWord::Unknown(raw) => return Self::from_raw(*raw, property_value(property)),
            ControlWord::Unicode => "u",
            ControlWord::UnicodeIgnoreCount => "uc",
            ControlWord::Par => "par",
            ControlWord::FontTable => "fonttbl",
            ControlWord::ColorTable => "colortbl",
            ControlWord::StyleSheet => "stylesheet",
            ControlWord::FileTable => "filetbl",
            _ => "",
        };
        Self {
            name,
            param: property_value(property),
            trailing: "",
        }
    }

    /// Splits a word the lexer did not recognise, e.g. `\cellx13680` or `\u8211?`.
    fn from_raw(raw: &'a str, property: Option<i32>) -> Self {
        let raw = raw.trim_start_matches('\\');
        let name_end = raw
            .find(|ch: char| !ch.is_ascii_alphabetic())
            .unwrap_or(raw.len());
        let (name, rest) = raw.split_at(name_end);
        let digits_end = rest
            .char_indices()
            .find(|&(index, ch)| !(ch.is_ascii_digit() || (index == 0 && ch == '-')))
            .map_or(rest.len(), |(index, _)| index);
        match rest[..digits_end].parse::<i32>() {
            Ok(param) => Self {
                name,
                param: Some(param),
                trailing: &rest[digits_end..],
            },
            Err(_) => Self {
                name,
                param: property,
                trailing: rest,
            },
        }
    }
}

fn property_value(property: &Property) -> Option<i32> {
    match property {
        Property::Value(value) => Some(*value),
        Property::On => Some(1),
        Property::Off => Some(0),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Destination {
    Body,
    Header,
    Skip,
}

#[derive(Clone, Copy, Debug)]
struct GroupState {
    destination: Destination,
    unicode_skip: usize,
}

impl Default for GroupState {
    fn default() -> Self {
        Self {
            destination: Destination::Body,
            unicode_skip: 1,
        }
    }
}

const HEADER_WORDS: &[&str] = &["header", "headerl", "headerr", "headerf"];

const SKIPPED_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "footnote",
    "listtable",
    "listoverridetable",
    "rsidtbl",
    "generator",
    "xmlnstbl",
    "themedata",
    "colorschememapping",
    "datastore",
    "latentstyles",
    "object",
    "fldinst",
    "filetbl",
    "revtbl",
    "pgdsctbl",
    "bkmkstart",
    "bkmkend",
    "nonshppict",
    "shppict",
    "sp",
];

/// Plain text recovered from an RTF document.
#[derive(Debug, Default)]
pub struct RtfText {
    header: String,
    body: String,
    pending_skip: usize,
    high_surrogate: Option<u16>,
}

impl RtfText {
    /// Interprets the token stream of `bytes`, read as Windows-1252.
    pub fn parse(bytes: &[u8]) -> Result<Self, ExtractError> {
        let source = fonts::decode_bytes(bytes);
        let tokens = Lexer::scan(&source).map_err(|err| ExtractError::Rtf(format!("{err:?}")))?;

        let mut text = Self::default();
        let mut stack: Vec<GroupState> = Vec::new();
        let mut state = GroupState::default();
        let mut header_seen = false;

        for token in &tokens {
            match token {
                Token::OpeningBracket => {
                    stack.push(state);
                    text.pending_skip = 0;
                }
                Token::ClosingBracket => {
                    let closed = state;
                    state = stack.pop().unwrap_or_default();
                    if closed.destination == Destination::Header
                        && state.destination != Destination::Header
                    {
                        text.header.push('\n');
                    }
                    text.pending_skip = 0;
                    if header_seen && text.body.len() >= BODY_CHAR_LIMIT {
                        break;
                    }
                }
                Token::IgnorableDestination => state.destination = Destination::Skip,
                Token::CRLF => text.push(state.destination, '\n'),
                Token::PlainText(run) => text.push_run(state.destination, run),
                Token::ControlSymbol((word, property)) => {
                    let control = Control::from_symbol(word, property);
                    if HEADER_WORDS.contains(&control.name) {
                        if state.destination != Destination::Skip {
                            state.destination = Destination::Header;
                            header_seen = true;
                        }
                    } else if SKIPPED_DESTINATIONS.contains(&control.name) {
                        state.destination = Destination::Skip;
                    } else {
                        text.apply(&mut state, &control);
                    }
                    text.push_run(state.destination, control.trailing);
                }
                _ => {}
            }
        }

        Ok(text)
    }

    fn apply(&mut self, state: &mut GroupState, control: &Control<'_>) {
        match control.name {
            "uc" => {
                state.unicode_skip = control
                    .param
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(1);
            }
            "u" => {
                let code = control.param.unwrap_or(0);
                match u8::try_from(code) {
                    // `\'hh` escapes reach here as byte values.
                    Ok(byte) if byte >= 0x80 => {
                        if self.pending_skip > 0 {
                            self.pending_skip -= 1;
                        } else {
                            self.push(state.destination, fonts::decode_byte(byte));
                        }
                    }
                    _ => {
                        let unit = (if code < 0 { code + 65536 } else { code }) as u32;
                        if let Some(ch) = combine_utf16(unit, &mut self.high_surrogate) {
                            self.push(state.destination, ch);
                        }
                        self.pending_skip = state.unicode_skip;
                    }
                }
            }
            name => {
                if let Some(ch) = word_replacement(name) {
                    self.push(state.destination, ch);
                }
            }
        }
    }

    fn push_run(&mut self, destination: Destination, run: &str) {
        for ch in run.chars().filter(|&ch| !matches!(ch, '\r' | '\n')) {
            if self.pending_skip > 0 {
                self.pending_skip -= 1;
            } else {
                self.push(destination, ch);
            }
        }
    }

    fn push(&mut self, destination: Destination, ch: char) {
        match destination {
            Destination::Header => self.header.push(ch),
            Destination::Body if self.body.len() < BODY_CHAR_LIMIT => self.body.push(ch),
            _ => {}
        }
    }

    /// Cleaned, non-empty lines of all header groups in document order.
    pub fn header_lines(&self) -> Vec<String> {
        clean_lines(&self.header)
    }

    /// Cleaned, non-empty lines of the leading body text.
    pub fn body_lines(&self) -> Vec<String> {
        clean_lines(&self.body)
    }
}

fn combine_utf16(unit: u32, high_surrogate: &mut Option<u16>) -> Option<char> {
    match unit {
        0xd800..=0xdbff => {
            *high_surrogate = u16::try_from(unit).ok();
            None
        }
        0xdc00..=0xdfff => {
            let high = high_surrogate.take()?;
            let low = u16::try_from(unit).ok()?;
            char::decode_utf16([high, low]).next()?.ok()
        }
        _ => {
            *high_surrogate = None;
            char::from_u32(unit)
        }
    }
}

fn word_replacement(word: &str) -> Option<char> {
    let ch = match word {
        "par" | "line" | "cell" | "row" | "sect" | "page" | "nestcell" | "nestrow" => '\n',
        "tab" | "emspace" | "enspace" | "qmspace" => ' ',
        "emdash" => '\u{2014}',
        "endash" => '\u{2013}',
        "bullet" => '\u{2022}',
        "lquote" => '\u{2018}',
        "rquote" => '\u{2019}',
        "ldblquote" => '\u{201c}',
        "rdblquote" => '\u{201d}',
        _ => return None,
    };
    Some(ch)
}

fn clean_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_matches(|ch: char| matches!(ch, '-' | ':' | ' '))
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

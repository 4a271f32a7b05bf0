//! Metrics and encoding for the standard PDF fonts used on TOC pages.
//!
//! TOC pages reference the built-in Helvetica faces, so no font program has to be embedded and
//! the output renders identically in every viewer. Text is written in WinAnsiEncoding; widths
//! come from the Adobe font metrics in thousandths of an em.

/// Standard Type 1 faces used by the TOC renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinFont {
    /// Regular weight, used for entries.
    Helvetica,
    /// Bold weight, used for the heading.
    HelveticaBold,
}

impl BuiltinFont {
    /// Name of the font as it appears in `/BaseFont`.
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
        }
    }

    /// Resource name used in content streams.
    pub fn resource_name(self) -> &'static str {
        match self {
            Self::Helvetica => "F1",
            Self::HelveticaBold => "F2",
        }
    }

    fn ascii_widths(self) -> &'static [u16; 95] {
        match self {
            Self::Helvetica => &HELVETICA_WIDTHS,
            Self::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
        }
    }

    /// Advance width of a single WinAnsi byte, in thousandths of an em.
    pub fn glyph_width(self, byte: u8) -> u16 {
        match byte {
            0x20..=0x7e => self.ascii_widths()[usize::from(byte - 0x20)],
            0x85 | 0x89 | 0x97 | 0x99 | 0x8c | 0x9c => 1000,
            0x91 | 0x92 | 0x82 => match self {
                Self::Helvetica => 222,
                Self::HelveticaBold => 278,
            },
            0x93 | 0x94 | 0x84 => match self {
                Self::Helvetica => 333,
                Self::HelveticaBold => 500,
            },
            0x95 => 350,
            0xa0 => 278,
            0xa9 | 0xae => 737,
            0xb0 => 400,
            0xb1 | 0xd7 | 0xf7 => 584,
            0xc0..=0xc5 | 0xc8..=0xcb | 0xd2..=0xd6 | 0xd8..=0xdd => 722,
            0xcc..=0xcf | 0xec..=0xef => 278,
            _ => 556,
        }
    }

    /// Width of `text` set at `size` points.
    pub fn text_width(self, text: &str, size: f32) -> f32 {
        let units: u32 = encode_text(text)
            .into_iter()
            .map(|byte| u32::from(self.glyph_width(byte)))
            .sum();
        units as f32 * size / 1000.0
    }

    /// Width of a single character set at `size` points.
    pub fn char_width(self, ch: char, size: f32) -> f32 {
        let byte = encode_char(ch).unwrap_or(b'?');
        f32::from(self.glyph_width(byte)) * size / 1000.0
    }
}

const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p'..'~'
];

/// Windows-1252 code points 0x80..=0x9F; `None` marks unassigned bytes.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20ac}'),
    None,
    Some('\u{201a}'),
    Some('\u{0192}'),
    Some('\u{201e}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02c6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017d}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201c}'),
    Some('\u{201d}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02dc}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203a}'),
    Some('\u{0153}'),
    None,
    Some('\u{017e}'),
    Some('\u{0178}'),
];

/// Decodes a Windows-1252 byte.
pub fn decode_byte(byte: u8) -> char {
    match byte {
        0x80..=0x9f => CP1252_HIGH[usize::from(byte - 0x80)].unwrap_or('\u{fffd}'),
        _ => char::from(byte),
    }
}

/// Decodes a Windows-1252 byte string.
pub fn decode_bytes(bytes: &[u8]) -> String {
    bytes.iter().copied().map(decode_byte).collect()
}

/// Encodes a character as a WinAnsi byte, if the encoding has it.
pub fn encode_char(ch: char) -> Option<u8> {
    let code = u32::from(ch);
    match code {
        0x20..=0x7e | 0xa0..=0xff => u8::try_from(code).ok(),
        _ => CP1252_HIGH
            .iter()
            .position(|candidate| *candidate == Some(ch))
            .and_then(|index| u8::try_from(0x80 + index).ok()),
    }
}

/// Encodes text as WinAnsi bytes, replacing unsupported characters with `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            '\t' | '\n' | '\r' => b' ',
            other => encode_char(other).unwrap_or(b'?'),
        })
        .collect()
}

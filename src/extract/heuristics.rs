//! Text heuristics shared by every extraction strategy.
//!
//! Clinical outputs put their identifier (`Table 14.1.1`, `Listing 16.2.4`, `Appendix 2`) on a
//! title line followed by one or two descriptive lines, surrounded by running headers and
//! footers such as the protocol number, program paths, dates and page counters. The helpers
//! here recognise the identifier, reject header/footer noise and assemble [`TitleParts`].

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::model::TitleParts;

/// Number of leading lines searched for a TLF identifier in header text.
pub const HEADER_WINDOW: usize = 10;
/// Number of leading lines searched in body text or first-page text.
pub const BODY_WINDOW: usize = 15;
/// Longest candidate accepted from body text.
pub const MAX_BODY_CANDIDATE_CHARS: usize = 200;

static TLF_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?:table|listing|figure)\s+)?appendix\s+\d+(?:\.\d+)*[a-z0-9]*|(?:table|listing|figure)\s+\d+(?:\.\d+)*[a-z0-9]*",
    )
    .expect("TLF number pattern is valid")
});

static NOTE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bnote\s*:").expect("note pattern is valid"));

static REFERENCE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\d+\]").expect("reference pattern is valid"));

static CONTROL_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\?\*").expect("control prefix pattern is valid"));

static UPPER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9\\*]+$").expect("upper token pattern is valid"));

static LEADING_NON_ALPHA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^a-z]*").expect("leading pattern is valid"));

static APPENDIX_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"appendix\s*(\d+)").expect("appendix pattern is valid"));

static DOTTED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("dotted number pattern is valid"));

static FOOTER_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"page\s+\d+",
        r"\d+\s+of\s+\d+",
        r"confidential",
        r"proprietary",
        r"\bdraft\b",
        r"\bfinal\b",
        r"version\s+[\d.]+",
        r"\d{1,2}[-/]\d{1,2}[-/]\d{2,4}",
        r"^\d+$",
        r"file\s*name\s*:",
        r"^[a-z]:\\",
        r"^/[a-z]",
        r"author\s*:",
        r"date\s*:",
        r"time\s*:",
        r"printed\s+on",
        r"generated\s+on",
        r"last\s+modified",
        r"\u{a9}",
        r"copyright",
        r"all\s+rights\s+reserved",
        r"sponsor",
        r"protocol\s+number",
        r"study\s+code",
        r"cdisc",
        r"sas\s+output",
        r"program\s*:",
        r"output\s*:",
    ])
    .expect("footer patterns are valid")
});

/// Collapses runs of whitespace to single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts a trailing `Note:` segment off a line.
pub fn strip_note(text: &str) -> &str {
    match NOTE_SPLIT.find(text) {
        Some(found) => text[..found.start()].trim(),
        None => text.trim(),
    }
}

fn alphabetic_count(text: &str) -> usize {
    text.chars().filter(|ch| ch.is_alphabetic()).count()
}

/// Recognises running header/footer content such as page counters, dates and paths.
pub fn is_footer_content(text: &str) -> bool {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    if FOOTER_PATTERNS.is_match(&lower) {
        return true;
    }
    if trimmed.chars().count() < 3 {
        return true;
    }
    if !trimmed.contains(' ') && trimmed.chars().count() > 30 {
        return true;
    }
    text.chars().count() > 8 && alphabetic_count(text) < 3
}

/// Accepts a line as a plausible title line.
pub fn is_title_candidate(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() || is_footer_content(candidate) {
        return false;
    }
    if candidate.to_lowercase().starts_with("note:") {
        return false;
    }
    if candidate.matches('.').count() > 2 {
        return false;
    }
    if REFERENCE_MARKER.is_match(candidate)
        || CONTROL_PREFIX.is_match(candidate)
        || UPPER_TOKEN.is_match(candidate)
    {
        return false;
    }
    let length = candidate.chars().count();
    !(length > 5 && (alphabetic_count(candidate) as f32) / (length as f32) < 0.3)
}

/// Where a TLF identifier may appear within a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Anywhere in the line.
    Anywhere,
    /// Only at the start of the line.
    Start,
}

fn find_identifier(line: &str, anchor: Anchor) -> Option<(usize, usize)> {
    let found = TLF_NUMBER.find(line)?;
    match anchor {
        Anchor::Start if found.start() != 0 => None,
        _ => Some((found.start(), found.end())),
    }
}

fn accepted(candidate: &str) -> Option<String> {
    let cleaned = strip_note(candidate);
    is_title_candidate(cleaned).then(|| collapse_whitespace(cleaned))
}

/// Looks for a TLF identifier within the first `window` lines and builds the title around it.
///
/// The identifier becomes the first title line. The rest of its line becomes the second one
/// when usable, otherwise the following line does; the next line after that becomes the third.
pub fn titled_from_identifier(lines: &[String], window: usize, anchor: Anchor) -> Option<TitleParts> {
    for (index, line) in lines.iter().take(window).enumerate() {
        let Some((start, end)) = find_identifier(line, anchor) else {
            continue;
        };

        let primary = collapse_whitespace(&line[start..end]);
        let remainder = line[end..].trim_matches(|ch: char| matches!(ch, ' ' | ':' | '\u{2013}' | '-'));
        let inline = if remainder.is_empty() {
            None
        } else {
            accepted(remainder)
        };
        let (secondary, next_line) = match inline {
            Some(text) => (Some(text), index + 1),
            None => (
                lines.get(index + 1).and_then(|next| accepted(next)),
                index + 2,
            ),
        };
        let tertiary = lines.get(next_line).and_then(|next| accepted(next));

        log::debug!("identifier {primary:?} found on line {index}");
        return Some(TitleParts::new(
            primary,
            secondary.unwrap_or_default(),
            tertiary.unwrap_or_default(),
        ));
    }
    None
}

/// Takes up to three plausible title lines from the first `window` lines.
pub fn titled_from_candidates(lines: &[String], window: usize) -> Option<TitleParts> {
    let mut found = lines
        .iter()
        .take(window)
        .filter_map(|line| accepted(line))
        .take(3);
    let primary = found.next()?;
    let secondary = found.next().unwrap_or_default();
    let tertiary = found.next().unwrap_or_default();
    Some(TitleParts::new(primary, secondary, tertiary))
}

/// Drops header/footer noise and empty lines.
pub fn without_footer_lines(lines: impl IntoIterator<Item = String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|line| collapse_whitespace(&line))
        .filter(|line| !line.is_empty() && !is_footer_content(line))
        .collect()
}

/// Category of an output, used for the initial sort of a folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutputCategory {
    /// Summary tables.
    Table,
    /// Data listings.
    Listing,
    /// Figures.
    Figure,
    /// Appendices.
    Appendix,
    /// Anything without a recognisable identifier.
    Other,
}

/// Sort key ordering tables before listings, figures and appendices, then by dotted number.
pub fn sort_key(bookmark: &str) -> (OutputCategory, Vec<u32>) {
    let lower = bookmark.to_lowercase();
    let text = LEADING_NON_ALPHA.replace(&lower, "");

    if text.contains("appendix") {
        let number = APPENDIX_NUMBER
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|digits| digits.as_str().parse().ok())
            .unwrap_or(9999);
        return (OutputCategory::Appendix, vec![number]);
    }

    let category = [
        ("table", OutputCategory::Table),
        ("listing", OutputCategory::Listing),
        ("figure", OutputCategory::Figure),
    ]
    .into_iter()
    .find(|(word, _)| text.contains(word))
    .map(|(_, category)| category);

    match category {
        Some(category) => {
            let numbers = DOTTED_NUMBER
                .find(&text)
                .map(|found| {
                    found
                        .as_str()
                        .split('.')
                        .filter_map(|part| part.parse().ok())
                        .collect()
                })
                .unwrap_or_else(|| vec![0]);
            (category, numbers)
        }
        None => (OutputCategory::Other, vec![0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn rejects_footer_noise() {
        assert!(is_footer_content("Page 3 of 12"));
        assert!(is_footer_content("Program: /sas/prod/t_dm.sas"));
        assert!(is_footer_content("12/03/2024"));
        assert!(is_footer_content("CONFIDENTIAL"));
        assert!(is_footer_content("42"));
        assert!(!is_footer_content("Demographic and Baseline Characteristics"));
    }

    #[test]
    fn validates_candidates() {
        assert!(is_title_candidate("Summary of Adverse Events"));
        assert!(!is_title_candidate("Note: percentages are based on N"));
        assert!(!is_title_candidate("ADSL"));
        assert!(!is_title_candidate("a.b.c.d"));
        assert!(!is_title_candidate("Reference [12]"));
        assert!(!is_title_candidate("   "));
    }

    #[test]
    fn strips_trailing_notes() {
        assert_eq!(strip_note("Vital Signs Note: see SAP"), "Vital Signs");
        assert_eq!(strip_note("Vital Signs"), "Vital Signs");
    }

    #[test]
    fn builds_title_from_identifier_line() {
        let lines = lines(&[
            "Study ABC-123",
            "Table 14.1.1 Demographics",
            "Safety Population",
        ]);
        let parts = titled_from_identifier(&lines, HEADER_WINDOW, Anchor::Anywhere).unwrap();
        assert_eq!(parts.compose(), "Table 14.1.1: Demographics - Safety Population");
    }

    #[test]
    fn takes_following_lines_when_identifier_stands_alone() {
        let lines = lines(&[
            "Listing 16.2.4.1",
            "Subject Disposition",
            "All Randomized Subjects",
        ]);
        let parts = titled_from_identifier(&lines, HEADER_WINDOW, Anchor::Start).unwrap();
        assert_eq!(parts.primary(), "Listing 16.2.4.1");
        assert_eq!(parts.secondary(), "Subject Disposition");
        assert_eq!(parts.tertiary(), "All Randomized Subjects");
    }

    #[test]
    fn anchored_search_ignores_inline_identifiers() {
        let lines = lines(&["See Table 14.1 for details"]);
        assert!(titled_from_identifier(&lines, HEADER_WINDOW, Anchor::Start).is_none());
        assert!(titled_from_identifier(&lines, HEADER_WINDOW, Anchor::Anywhere).is_some());
    }

    #[test]
    fn recognises_appendix_identifiers() {
        let lines = lines(&["Appendix 2.1: Protocol Deviations"]);
        let parts = titled_from_identifier(&lines, HEADER_WINDOW, Anchor::Anywhere).unwrap();
        assert_eq!(parts.primary(), "Appendix 2.1");
        assert_eq!(parts.secondary(), "Protocol Deviations");
    }

    #[test]
    fn candidates_fill_three_lines() {
        let lines = lines(&["Overview", "Page 1 of 2", "Summary of Exposure", "By Visit", "Extra"]);
        let parts = titled_from_candidates(&lines, BODY_WINDOW).unwrap();
        assert_eq!(parts.compose(), "Overview: Summary of Exposure - By Visit");
    }

    #[test]
    fn sorts_tables_before_listings_and_figures() {
        let mut titles = vec![
            "Figure 14.2.1: KM plot",
            "Appendix 1",
            "Listing 16.1",
            "Table 14.1.10",
            "Table 14.1.2",
            "Unnumbered",
        ];
        titles.sort_by_key(|title| sort_key(title));
        assert_eq!(
            titles,
            vec![
                "Table 14.1.2",
                "Table 14.1.10",
                "Listing 16.1",
                "Figure 14.2.1: KM plot",
                "Appendix 1",
                "Unnumbered",
            ]
        );
    }
}

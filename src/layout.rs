//! Pagination of the table of contents.
//!
//! The TOC sits in front of the content pages, so the page number printed for an entry depends
//! on how many pages the TOC itself occupies. [`plan_toc`] settles this with a fixed-point
//! iteration: it estimates the TOC length, computes every start page from it, lays the entries
//! out against those page numbers and repeats until the TOC length no longer changes.
//!
//! In truncate mode every entry takes exactly one line, so the first estimate is already
//! final. In wrap mode an entry may need more lines once its page number gets wider, which can
//! only ever grow the TOC; the iteration is capped at [`MAX_ITERATIONS`].

use crate::config::{PackagerConfig, TocOverflow};
use crate::error::LayoutError;
use crate::fonts::BuiltinFont;

/// Upper bound on layout passes.
pub const MAX_ITERATIONS: usize = 5;

/// Heading size relative to the entry font size.
const HEADING_SCALE: f32 = 1.5;

/// Line pitch relative to the font size.
const LINE_SPACING: f32 = 1.5;

/// Leader characters always kept between an entry and its page number.
const MIN_LEADER_CHARS: usize = 3;

const ELLIPSIS: &str = "\u{2026}";

/// Page geometry and typography of TOC pages, in points.
#[derive(Clone, Debug, PartialEq)]
pub struct TocGeometry {
    /// Page width.
    pub page_width: f32,
    /// Page height.
    pub page_height: f32,
    /// Left edge of the text column.
    pub left: f32,
    /// Right edge of the text column; page numbers are right-aligned here.
    pub right: f32,
    /// Top margin.
    pub top: f32,
    /// Font size of entries.
    pub font_size: f32,
    /// Font size of the heading.
    pub heading_size: f32,
    /// Vertical room reserved for the heading on each page.
    pub heading_height: f32,
    /// Distance between two entry baselines.
    pub line_height: f32,
    /// Entry lines per TOC page.
    pub lines_per_page: usize,
    /// Leader character.
    pub leader: char,
    /// Heading printed on the first TOC page.
    pub title: String,
}

impl TocGeometry {
    /// Derives the geometry from the configuration.
    ///
    /// When `lines_per_page` is not configured it is computed from the printable height; a
    /// configured value larger than what fits tightens the line pitch instead.
    pub fn from_config(config: &PackagerConfig) -> Result<Self, LayoutError> {
        let (page_width, page_height) = config.page_size.dimensions();
        let margins = config.margins;
        let font_size = config.font_size;
        let heading_size = font_size * HEADING_SCALE;
        let heading_height = heading_size * 2.0;

        let usable = page_height - margins.top - margins.bottom - heading_height;
        let natural_pitch = font_size * LINE_SPACING;
        if usable < font_size || !(font_size > 0.0) {
            return Err(LayoutError::NoLineCapacity);
        }

        let lines_per_page = match config.lines_per_page {
            Some(lines) => lines,
            None => (usable / natural_pitch).floor() as usize,
        };
        if lines_per_page == 0 {
            return Err(LayoutError::NoLineCapacity);
        }
        let line_height = natural_pitch.min(usable / lines_per_page as f32);

        Ok(Self {
            page_width,
            page_height,
            left: margins.left,
            right: page_width - margins.right,
            top: margins.top,
            font_size,
            heading_size,
            heading_height,
            line_height,
            lines_per_page,
            leader: config.dot_leader_char,
            title: config.toc_title.clone(),
        })
    }

    /// Width of the text column.
    pub fn column_width(&self) -> f32 {
        self.right - self.left
    }

    /// Gap kept on both sides of the leader.
    pub fn gap(&self) -> f32 {
        BuiltinFont::Helvetica.char_width(' ', self.font_size)
    }

    /// Width left for entry text when the page number `label` is printed on the same line.
    pub fn text_width_for(&self, label: &str) -> f32 {
        let label_width = BuiltinFont::Helvetica.text_width(label, self.font_size);
        let leader_width =
            BuiltinFont::Helvetica.char_width(self.leader, self.font_size) * MIN_LEADER_CHARS as f32;
        self.column_width() - label_width - leader_width - 2.0 * self.gap()
    }
}

/// An entry handed to the layout engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TocSource<'a> {
    /// Text of the entry, identical to the outline title.
    pub text: &'a str,
    /// Page count of the document, if known.
    pub page_count: Option<usize>,
}

/// One document in the final package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Full entry text.
    pub text: String,
    /// 1-based page of the final file where the document starts.
    pub start_page: usize,
    /// Number of pages the document contributes.
    pub page_count: usize,
}

/// A rendered TOC line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocLine {
    /// Index of the entry the line belongs to.
    pub entry: usize,
    /// Text printed on the line.
    pub text: String,
    /// Page number printed at the right edge; only the last line of an entry carries one.
    pub page_label: Option<String>,
}

/// Result of the layout: start pages and the lines of each TOC page.
#[derive(Clone, Debug, PartialEq)]
pub struct TocPlan {
    entries: Vec<TocEntry>,
    pages: Vec<Vec<TocLine>>,
    geometry: TocGeometry,
    iterations: usize,
}

impl TocPlan {
    /// Entries in pack order.
    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    /// Lines grouped by TOC page.
    pub fn pages(&self) -> &[Vec<TocLine>] {
        &self.pages
    }

    /// Number of TOC pages in front of the content.
    pub fn toc_page_count(&self) -> usize {
        self.pages.len()
    }

    /// Geometry the plan was computed for.
    pub fn geometry(&self) -> &TocGeometry {
        &self.geometry
    }

    /// Layout passes needed to reach the fixed point.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Total pages of the final file.
    pub fn total_pages(&self) -> usize {
        self.toc_page_count() + self.entries.iter().map(|entry| entry.page_count).sum::<usize>()
    }
}

/// Start pages of documents following `toc_pages` TOC pages.
pub fn start_pages(toc_pages: usize, page_counts: &[usize]) -> Vec<usize> {
    let mut next = 1 + toc_pages;
    page_counts
        .iter()
        .map(|count| {
            let start = next;
            next += count;
            start
        })
        .collect()
}

/// Computes the TOC pagination for `sources`.
///
/// Packages built without TOC pages use [`plan_without_toc`].
pub fn plan_toc(
    sources: &[TocSource<'_>],
    geometry: &TocGeometry,
    overflow: TocOverflow,
) -> Result<TocPlan, LayoutError> {
    let page_counts = page_counts(sources)?;
    if sources.is_empty() {
        return Ok(TocPlan {
            entries: Vec::new(),
            pages: Vec::new(),
            geometry: geometry.clone(),
            iterations: 0,
        });
    }

    let lines_per_page = geometry.lines_per_page;
    let mut toc_pages = sources.len().div_ceil(lines_per_page);

    for iteration in 1..=MAX_ITERATIONS {
        let starts = start_pages(toc_pages, &page_counts);
        let mut pages = paginate(
            lay_out_lines(sources, &starts, geometry, overflow),
            lines_per_page,
        );
        let needed = pages.len();

        if needed <= toc_pages {
            log::debug!(
                "TOC layout settled on {toc_pages} page(s) after {iteration} pass(es)"
            );
            // A shorter layout than estimated keeps the estimated page count.
            pages.resize_with(toc_pages, Vec::new);

            let entries = sources
                .iter()
                .zip(starts)
                .zip(&page_counts)
                .map(|((source, start_page), count)| TocEntry {
                    text: source.text.to_string(),
                    start_page,
                    page_count: *count,
                })
                .collect();
            return Ok(TocPlan {
                entries,
                pages,
                geometry: geometry.clone(),
                iterations: iteration,
            });
        }
        toc_pages = needed;
    }

    Err(LayoutError::NotConverged {
        iterations: MAX_ITERATIONS,
    })
}

/// Computes start pages for a package without TOC pages.
pub fn plan_without_toc(
    sources: &[TocSource<'_>],
    geometry: &TocGeometry,
) -> Result<TocPlan, LayoutError> {
    let page_counts = page_counts(sources)?;
    let entries = sources
        .iter()
        .zip(start_pages(0, &page_counts))
        .zip(&page_counts)
        .map(|((source, start_page), count)| TocEntry {
            text: source.text.to_string(),
            start_page,
            page_count: *count,
        })
        .collect();
    Ok(TocPlan {
        entries,
        pages: Vec::new(),
        geometry: geometry.clone(),
        iterations: 1,
    })
}

fn page_counts(sources: &[TocSource<'_>]) -> Result<Vec<usize>, LayoutError> {
    sources
        .iter()
        .enumerate()
        .map(|(index, source)| source.page_count.ok_or(LayoutError::MissingPageCount { index }))
        .collect()
}

fn lay_out_lines(
    sources: &[TocSource<'_>],
    starts: &[usize],
    geometry: &TocGeometry,
    overflow: TocOverflow,
) -> Vec<TocLine> {
    let mut lines = Vec::new();
    for (index, (source, start)) in sources.iter().zip(starts).enumerate() {
        let label = start.to_string();
        let width = geometry.text_width_for(&label);
        let text = single_line(source.text);
        let mut rendered = match overflow {
            TocOverflow::Truncate => vec![truncate(&text, width, geometry.font_size)],
            TocOverflow::Wrap => wrap(&text, width, geometry.font_size),
        };
        let last = rendered.pop().unwrap_or_default();
        lines.extend(rendered.into_iter().map(|text| TocLine {
            entry: index,
            text,
            page_label: None,
        }));
        lines.push(TocLine {
            entry: index,
            text: last,
            page_label: Some(label),
        });
    }
    lines
}

/// Fills pages of `lines_per_page` lines, moving an entry whole to the next page when its lines
/// do not fit on the current one. Only an entry longer than a page is split.
fn paginate(lines: Vec<TocLine>, lines_per_page: usize) -> Vec<Vec<TocLine>> {
    let mut pages = Vec::new();
    let mut current: Vec<TocLine> = Vec::new();
    let mut lines = lines.into_iter().peekable();

    while let Some(first) = lines.next() {
        let entry = first.entry;
        let mut group = vec![first];
        while let Some(line) = lines.next_if(|line| line.entry == entry) {
            group.push(line);
        }

        if !current.is_empty() && current.len() + group.len() > lines_per_page {
            pages.push(std::mem::take(&mut current));
        }
        for line in group {
            if current.len() == lines_per_page {
                pages.push(std::mem::take(&mut current));
            }
            current.push(line);
        }
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn measure(text: &str, size: f32) -> f32 {
    BuiltinFont::Helvetica.text_width(text, size)
}

/// Cuts `text` to `width`, appending an ellipsis when anything was removed.
pub fn truncate(text: &str, width: f32, size: f32) -> String {
    if measure(text, size) <= width {
        return text.to_string();
    }
    let room = width - measure(ELLIPSIS, size);
    let mut kept = String::new();
    let mut used = 0.0;
    for ch in text.chars() {
        let advance = BuiltinFont::Helvetica.char_width(ch, size);
        if used + advance > room {
            break;
        }
        used += advance;
        kept.push(ch);
    }
    let mut kept = kept.trim_end().to_string();
    kept.push_str(ELLIPSIS);
    kept
}

/// Greedy word wrap of `text` into lines no wider than `width`.
pub fn wrap(text: &str, width: f32, size: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate, size) <= width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if measure(word, size) <= width {
            current = word.to_string();
            continue;
        }
        for ch in word.chars() {
            let mut extended = current.clone();
            extended.push(ch);
            if !current.is_empty() && measure(&extended, size) > width {
                lines.push(std::mem::take(&mut current));
                current.push(ch);
            } else {
                current = extended;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

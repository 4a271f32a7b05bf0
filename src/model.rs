//! Data structures describing the files that make up a package.
//!
//! An [`OutputItem`] is created once per discovered file and then travels through the pipeline:
//! the extractor fills in its title, the caller edits its bookmark text and inclusion flag, and
//! the packaging run records the converted PDF and page count.

use std::fmt;
use std::path::{Path, PathBuf};

/// Source formats the packager understands.
///
/// The format is decided once from the file extension at discovery time and selects the title
/// extraction strategy and whether the file has to be converted before merging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentFormat {
    /// Rich Text Format, typically SAS ODS output.
    Rtf,
    /// Office Open XML word processing document.
    Docx,
    /// Already rendered PDF.
    Pdf,
}

impl DocumentFormat {
    /// Determines the format from a file extension, ignoring case.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "rtf" => Some(Self::Rtf),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Upper-case label used in logs and exports.
    pub fn label(self) -> &'static str {
        match self {
            Self::Rtf => "RTF",
            Self::Docx => "DOCX",
            Self::Pdf => "PDF",
        }
    }

    /// Whether the format must go through the document converter before merging.
    pub fn needs_conversion(self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Up to three title lines identified by the extractor.
///
/// Clinical outputs usually carry the number in the first line (`Table 14.1.1`), the subject in
/// the second (`Demographics`) and the population in the third (`Safety Population`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleParts {
    primary: String,
    secondary: String,
    tertiary: String,
}

impl TitleParts {
    /// Creates title parts from up to three lines.
    pub fn new(
        primary: impl Into<String>,
        secondary: impl Into<String>,
        tertiary: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
            tertiary: tertiary.into(),
        }
    }

    /// Creates a title consisting of a single line.
    pub fn single(primary: impl Into<String>) -> Self {
        Self::new(primary, String::new(), String::new())
    }

    /// First title line.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Second title line, possibly empty.
    pub fn secondary(&self) -> &str {
        &self.secondary
    }

    /// Third title line, possibly empty.
    pub fn tertiary(&self) -> &str {
        &self.tertiary
    }

    /// Returns `true` when no line was found.
    pub fn is_empty(&self) -> bool {
        self.primary.trim().is_empty()
            && self.secondary.trim().is_empty()
            && self.tertiary.trim().is_empty()
    }

    /// Joins the lines as `primary: secondary - tertiary`, skipping empty lines.
    pub fn compose(&self) -> String {
        let mut title = self.primary.trim().to_string();
        let secondary = self.secondary.trim();
        let tertiary = self.tertiary.trim();
        if !secondary.is_empty() {
            if title.is_empty() {
                title.push_str(secondary);
            } else {
                title.push_str(": ");
                title.push_str(secondary);
            }
        }
        if !tertiary.is_empty() {
            if title.is_empty() {
                title.push_str(tertiary);
            } else {
                title.push_str(" - ");
                title.push_str(tertiary);
            }
        }
        title
    }
}

/// One discovered file together with its packaging metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputItem {
    source_path: PathBuf,
    format: DocumentFormat,
    title: TitleParts,
    extracted_title: String,
    bookmark_text: String,
    included: bool,
    order_index: Option<usize>,
    converted_pdf_path: Option<PathBuf>,
    page_count: Option<usize>,
    stale: bool,
}

impl OutputItem {
    /// Creates an included item whose bookmark text starts out as the extracted title.
    pub fn new(source_path: impl Into<PathBuf>, format: DocumentFormat, title: TitleParts) -> Self {
        let extracted_title = title.compose();
        Self {
            source_path: source_path.into(),
            format,
            bookmark_text: extracted_title.clone(),
            extracted_title,
            title,
            included: true,
            order_index: None,
            converted_pdf_path: None,
            page_count: None,
            stale: false,
        }
    }

    /// Path of the discovered source file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// File name of the source, used as the bookmark fallback.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    /// Format decided at discovery time.
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// Title lines found by the extractor.
    pub fn title_parts(&self) -> &TitleParts {
        &self.title
    }

    /// Title composed by the extractor; empty when no heuristic matched.
    pub fn extracted_title(&self) -> &str {
        &self.extracted_title
    }

    /// Bookmark text exactly as stored, possibly blank.
    pub fn bookmark_text(&self) -> &str {
        &self.bookmark_text
    }

    /// Text used in the outline and TOC; falls back to the file name when blank.
    pub fn effective_bookmark(&self) -> String {
        if self.bookmark_text.trim().is_empty() {
            self.file_name()
        } else {
            self.bookmark_text.clone()
        }
    }

    /// Replaces the bookmark text; the value is kept verbatim.
    pub fn set_bookmark_text(&mut self, text: impl Into<String>) {
        self.bookmark_text = text.into();
    }

    /// Whether the item takes part in packaging.
    pub fn is_included(&self) -> bool {
        self.included
    }

    /// Position among included items, `None` while excluded.
    pub fn order_index(&self) -> Option<usize> {
        self.order_index
    }

    /// PDF produced by the converter, if conversion succeeded.
    pub fn converted_pdf_path(&self) -> Option<&Path> {
        self.converted_pdf_path.as_deref()
    }

    /// PDF the assembler reads: the source for PDF items, the conversion result otherwise.
    pub fn pdf_path(&self) -> Option<&Path> {
        if self.format.needs_conversion() {
            self.converted_pdf_path()
        } else {
            Some(&self.source_path)
        }
    }

    /// Page count recorded by the last packaging run.
    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    /// Whether the last rescan no longer found the source file.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn set_included(&mut self, included: bool) {
        self.included = included;
    }

    pub(crate) fn set_order_index(&mut self, order_index: Option<usize>) {
        self.order_index = order_index;
    }

    pub(crate) fn set_stale(&mut self, stale: bool) {
        self.stale = stale;
    }

    pub(crate) fn record_conversion(&mut self, pdf_path: Option<PathBuf>) {
        self.converted_pdf_path = pdf_path;
    }

    pub(crate) fn record_page_count(&mut self, page_count: Option<usize>) {
        self.page_count = page_count;
    }
}

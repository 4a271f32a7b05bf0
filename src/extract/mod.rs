//! Title extraction for the supported source formats.
//!
//! [`extract_title`] never fails: a file that cannot be read or carries no recognisable title
//! yields an empty [`TitleParts`], and the caller falls back to the file name.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{DocumentFormat, TitleParts};

pub mod docx;
pub mod heuristics;
pub mod pdf;
pub mod rtf;

/// Reasons a title could not be read from a file.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file or one of its parts could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or package part being read.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// A DOCX package lacks a required part.
    #[error("package has no {0} part")]
    MissingPart(&'static str),

    /// The DOCX container is not a valid ZIP archive.
    #[error("invalid DOCX container: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A DOCX part is not well-formed XML.
    #[error("malformed DOCX XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The RTF source could not be tokenized.
    #[error("malformed RTF: {0}")]
    Rtf(String),

    /// The PDF could not be parsed.
    #[error("failed to parse PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    /// The PDF is encrypted.
    #[error("PDF is encrypted")]
    Encrypted,
}

/// Extracts the title lines of `path` using the strategy for `format`.
pub fn extract_title(path: &Path, format: DocumentFormat) -> TitleParts {
    let result = match format {
        DocumentFormat::Rtf => rtf::extract(path),
        DocumentFormat::Docx => docx::extract(path),
        DocumentFormat::Pdf => pdf::extract(path),
    };

    match result {
        Ok(title) => {
            if title.is_empty() {
                log::debug!("no title found in {}", path.display());
            } else {
                log::debug!("extracted title {:?} from {}", title.compose(), path.display());
            }
            title
        }
        Err(err) => {
            log::warn!("title extraction failed for {}: {err}", path.display());
            TitleParts::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::extract_title;
    use crate::model::DocumentFormat;

    #[test]
    fn unreadable_files_yield_empty_titles() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let docx = dir.path().join("broken.docx");
        fs::write(&docx, b"not a zip").expect("write fixture");

        assert!(extract_title(&docx, DocumentFormat::Docx).is_empty());
        assert!(extract_title(&dir.path().join("missing.rtf"), DocumentFormat::Rtf).is_empty());
    }

    #[test]
    fn extraction_is_repeatable() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let rtf = dir.path().join("t_14_1_1.rtf");
        fs::write(
            &rtf,
            br"{\rtf1\ansi{\header\pard Table 14.1.1\par Demographics\par}\pard Body\par}",
        )
        .expect("write fixture");

        let first = extract_title(&rtf, DocumentFormat::Rtf);
        let second = extract_title(&rtf, DocumentFormat::Rtf);
        assert_eq!(first, second);
        assert_eq!(first.compose(), "Table 14.1.1: Demographics");
    }
}

//! Error types shared by the packaging pipeline.
//!
//! Per-item failures ([`ConversionError`], [`UnreadablePdfError`]) are isolated by the
//! pipeline and end up in the run report, while the remaining kinds abort a run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for packager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by fallible packager operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The input folder could not be scanned.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The table of contents could not be laid out.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// The final package could not be produced.
    #[error(transparent)]
    Packaging(#[from] PackagingError),

    /// A configuration file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The manifest could not be exported.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The document converter cannot run at all.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A terminate request was observed between two steps of a run.
    #[error("run cancelled after {completed} of {total} items")]
    Cancelled {
        /// Number of items fully processed before the cancellation was observed.
        completed: usize,
        /// Number of items scheduled for the run.
        total: usize,
    },
}

/// Failure to enumerate the input folder.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The folder does not exist.
    #[error("folder {0} does not exist")]
    Missing(PathBuf),

    /// The path exists but is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    /// Reading the folder failed.
    #[error("failed to read folder {path}: {source}")]
    Unreadable {
        /// Folder being scanned.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Failure to convert a single RTF/DOCX file into PDF.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The converter program could not be started at all.
    #[error("document converter `{program}` is unavailable: {source}")]
    Unavailable {
        /// Program that was spawned.
        program: String,
        /// Spawn failure.
        #[source]
        source: io::Error,
    },

    /// The converter did not finish within the configured timeout.
    #[error("conversion of {path} timed out after {timeout:?}")]
    Timeout {
        /// Source document.
        path: PathBuf,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The converter ran but reported a failure.
    #[error("converter failed on {path}: {message}")]
    Failed {
        /// Source document.
        path: PathBuf,
        /// Converter diagnostics.
        message: String,
    },

    /// The converter exited cleanly but no PDF appeared where expected.
    #[error("converter produced no PDF for {path} (expected {expected})")]
    MissingOutput {
        /// Source document.
        path: PathBuf,
        /// Path the converter was expected to write.
        expected: PathBuf,
    },

    /// The source format cannot be converted.
    #[error("{0} is already a PDF and needs no conversion")]
    NotConvertible(PathBuf),

    /// I/O failure around the conversion.
    #[error("I/O error while converting {path}: {source}")]
    Io {
        /// Source document.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

impl ConversionError {
    /// Returns `true` when the failure means no further conversion can succeed in this run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure to read a PDF for page counting or merging.
#[derive(Error, Debug)]
pub enum UnreadablePdfError {
    /// The file could not be parsed.
    #[error("failed to parse PDF {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: lopdf::Error,
    },

    /// The file is encrypted and no password is available.
    #[error("PDF {0} is encrypted")]
    Encrypted(PathBuf),

    /// The file parses but has no pages to merge.
    #[error("PDF {0} has no pages")]
    NoPages(PathBuf),
}

/// Failure to compute the table of contents plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The geometry leaves no room for a single TOC line.
    #[error("page geometry leaves no room for TOC lines")]
    NoLineCapacity,

    /// The page count estimate kept growing past the iteration cap.
    #[error("TOC pagination did not converge after {iterations} iterations")]
    NotConverged {
        /// Number of iterations performed.
        iterations: usize,
    },

    /// An entry reached the layout engine without a page count.
    #[error("entry {index} has no page count")]
    MissingPageCount {
        /// Position of the entry in pack order.
        index: usize,
    },
}

/// Failure to produce the final package.
#[derive(Error, Debug)]
pub enum PackagingError {
    /// No item was selected for packing.
    #[error("no items are selected for packing")]
    NothingToPack,

    /// Every selected item failed conversion or page counting.
    #[error("all {0} selected items failed; no package was written")]
    AllItemsFailed(usize),

    /// Some items failed and partial results are not accepted.
    #[error("{skipped} of {total} items failed and partial packages are disabled")]
    PartialRejected {
        /// Number of failed items.
        skipped: usize,
        /// Number of selected items.
        total: usize,
    },

    /// A pack run was attempted on stale state.
    #[error("item {0} has no PDF to merge")]
    MissingPdf(PathBuf),

    /// The merged document could not be assembled.
    #[error("failed to assemble PDF: {0}")]
    Assemble(#[from] lopdf::Error),

    /// Outline construction failed.
    #[error(transparent)]
    Bookmarks(#[from] crate::bookmarks::BookmarkError),

    /// Writing the output file failed.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Target output path.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Failure to load a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML for [`crate::config::PackagerConfig`].
    #[error("invalid config {path}: {source}")]
    Parse {
        /// Configuration file.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{key}`: {message}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Explanation.
        message: String,
    },
}

/// Failure to write the manifest export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// CSV serialization failed.
    #[error("failed to write manifest export: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the output failed.
    #[error("I/O error during manifest export: {0}")]
    Io(#[from] io::Error),
}

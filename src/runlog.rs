//! Append-only record of what happened during discovery and packaging.
//!
//! Every event is also forwarded to the `log` facade, so the same trail shows up in the
//! process log and in the list the caller presents to the user.

use std::fmt;
use std::path::PathBuf;

use crate::manifest::Manifest;
use crate::model::DocumentFormat;

/// A single step of a run.
#[derive(Clone, Debug, PartialEq)]
pub enum LogEvent {
    /// A file was found in the input folder.
    Discovered {
        /// Source file.
        path: PathBuf,
        /// Detected format.
        format: DocumentFormat,
        /// Extracted title, empty when none was found.
        title: String,
    },
    /// A source was converted to PDF.
    Converted {
        /// Source file.
        path: PathBuf,
        /// Produced PDF.
        pdf: PathBuf,
    },
    /// Pages of an item were counted.
    PagesCounted {
        /// PDF that was counted.
        path: PathBuf,
        /// Number of pages.
        pages: usize,
    },
    /// An item was left out of the package.
    Skipped {
        /// Source file.
        path: PathBuf,
        /// Human readable reason.
        reason: String,
    },
    /// The package was written.
    Packed {
        /// Output file.
        output: PathBuf,
        /// Documents in the package.
        items: usize,
        /// Pages in the package, TOC included.
        pages: usize,
    },
    /// The run stopped on a cancel request.
    Cancelled {
        /// Items processed before the request was seen.
        completed: usize,
    },
    /// The run aborted.
    Failed {
        /// Error message.
        message: String,
    },
}

impl LogEvent {
    fn level(&self) -> log::Level {
        match self {
            Self::Skipped { .. } | Self::Cancelled { .. } => log::Level::Warn,
            Self::Failed { .. } => log::Level::Error,
            Self::Discovered { .. } | Self::Converted { .. } | Self::PagesCounted { .. } => {
                log::Level::Debug
            }
            Self::Packed { .. } => log::Level::Info,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered {
                path,
                format,
                title,
            } => {
                if title.is_empty() {
                    write!(f, "found {format} {} (no title)", path.display())
                } else {
                    write!(f, "found {format} {}: {title}", path.display())
                }
            }
            Self::Converted { path, pdf } => {
                write!(f, "converted {} -> {}", path.display(), pdf.display())
            }
            Self::PagesCounted { path, pages } => {
                write!(f, "{} has {pages} page(s)", path.display())
            }
            Self::Skipped { path, reason } => write!(f, "skipped {}: {reason}", path.display()),
            Self::Packed {
                output,
                items,
                pages,
            } => write!(
                f,
                "wrote {} with {items} document(s), {pages} page(s)",
                output.display()
            ),
            Self::Cancelled { completed } => {
                write!(f, "cancelled after {completed} item(s)")
            }
            Self::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Ordered list of [`LogEvent`]s.
#[derive(Clone, Debug, Default)]
pub struct RunLog {
    events: Vec<LogEvent>,
}

impl RunLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and mirrors it to the `log` facade.
    pub fn record(&mut self, event: LogEvent) {
        log::log!(event.level(), "{event}");
        self.events.push(event);
    }

    /// Records a discovery event for every item of `manifest`.
    pub fn record_manifest(&mut self, manifest: &Manifest) {
        for item in manifest.items() {
            self.record(LogEvent::Discovered {
                path: item.source_path().to_path_buf(),
                format: item.format(),
                title: item.extracted_title().to_string(),
            });
        }
    }

    /// All events in the order they were recorded.
    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    /// Events for items left out of a package.
    pub fn skipped(&self) -> impl Iterator<Item = &LogEvent> {
        self.events
            .iter()
            .filter(|event| matches!(event, LogEvent::Skipped { .. }))
    }
}

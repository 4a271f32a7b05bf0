//! The pack run: conversion, page counting, TOC layout and assembly.
//!
//! Items are processed one at a time in pack order. A failing item is recorded in the
//! [`PackReport`] and left out; only conditions that make the whole package impossible abort the
//! run. The output is written to a temporary file in the target folder and moved into place once
//! complete, so a failed or cancelled run never leaves a partial package behind.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone};
use lopdf::Document;
use tempfile::NamedTempFile;

use crate::config::PackagerConfig;
use crate::convert::DocumentConverter;
use crate::error::{ConversionError, Error, PackagingError, Result, UnreadablePdfError};
use crate::layout::{self, TocGeometry, TocSource};
use crate::manifest::Manifest;
use crate::merge;
use crate::pages;
use crate::runlog::{LogEvent, RunLog};

/// Shared flag asking a running pack to stop.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the run stops at its next check.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an item was left out of the package.
#[derive(Debug)]
pub enum SkipReason {
    /// The source disappeared from disk.
    Vanished,
    /// Conversion to PDF failed.
    Conversion(ConversionError),
    /// The PDF could not be read.
    UnreadablePdf(UnreadablePdfError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vanished => f.write_str("source file no longer exists"),
            Self::Conversion(err) => write!(f, "{err}"),
            Self::UnreadablePdf(err) => write!(f, "{err}"),
        }
    }
}

/// An item left out of the package.
#[derive(Debug)]
pub struct SkippedItem {
    /// Source file.
    pub source_path: PathBuf,
    /// Reason it was skipped.
    pub reason: SkipReason,
}

/// An item in the package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedItem {
    /// Source file.
    pub source_path: PathBuf,
    /// Outline and TOC text.
    pub bookmark_text: String,
    /// First page of the item in the package.
    pub start_page: usize,
    /// Pages contributed by the item.
    pub page_count: usize,
}

/// Outcome of a successful pack run.
#[derive(Debug)]
pub struct PackReport {
    /// Written package.
    pub output_path: PathBuf,
    /// Pages of generated TOC.
    pub toc_pages: usize,
    /// Pages of the package.
    pub total_pages: usize,
    /// Packed items in package order.
    pub packed: Vec<PackedItem>,
    /// Items that were left out.
    pub skipped: Vec<SkippedItem>,
}

impl PackReport {
    /// Whether every selected item made it into the package.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Runs pack operations for one configuration and converter.
pub struct Packager<'a> {
    config: &'a PackagerConfig,
    converter: &'a dyn DocumentConverter,
    cancel: CancelToken,
}

struct Loaded {
    manifest_index: usize,
    document: Document,
    page_count: usize,
}

impl<'a> Packager<'a> {
    /// Creates a packager.
    pub fn new(config: &'a PackagerConfig, converter: &'a dyn DocumentConverter) -> Self {
        Self {
            config,
            converter,
            cancel: CancelToken::new(),
        }
    }

    /// Uses `cancel` to observe stop requests.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Packs the selected items of `manifest` into `output`.
    ///
    /// Conversion results and page counts are written back to the manifest items.
    pub fn pack(&self, manifest: &mut Manifest, output: &Path, log: &mut RunLog) -> Result<PackReport> {
        let result = self.run(manifest, output, log);
        match &result {
            Ok(report) => log.record(LogEvent::Packed {
                output: report.output_path.clone(),
                items: report.packed.len(),
                pages: report.total_pages,
            }),
            Err(Error::Cancelled { completed, .. }) => log.record(LogEvent::Cancelled {
                completed: *completed,
            }),
            Err(err) => log.record(LogEvent::Failed {
                message: err.to_string(),
            }),
        }
        result
    }

    fn run(&self, manifest: &mut Manifest, output: &Path, log: &mut RunLog) -> Result<PackReport> {
        let geometry = TocGeometry::from_config(self.config)?;
        let mut order: Vec<(usize, usize)> = manifest
            .items()
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.order_index().map(|order| (order, index)))
            .collect();
        order.sort_unstable();
        let selected: Vec<usize> = order.into_iter().map(|(_, index)| index).collect();
        let total = selected.len();
        if total == 0 {
            return Err(PackagingError::NothingToPack.into());
        }
        log::info!("packing {total} item(s) into {}", output.display());

        let work_dir = tempfile::Builder::new()
            .prefix("tlf-packager-")
            .tempdir()
            .map_err(|source| PackagingError::Write {
                path: std::env::temp_dir(),
                source,
            })?;

        let mut loaded: Vec<Loaded> = Vec::new();
        let mut skipped: Vec<SkippedItem> = Vec::new();
        for (position, &index) in selected.iter().enumerate() {
            self.check_cancel(position, total)?;
            match self.prepare_item(manifest, index, (position, total), work_dir.path(), log) {
                Ok(item) => loaded.push(item),
                Err(PrepareError::Skip(reason)) => {
                    let source_path = manifest.items()[index].source_path().to_path_buf();
                    log.record(LogEvent::Skipped {
                        path: source_path.clone(),
                        reason: reason.to_string(),
                    });
                    skipped.push(SkippedItem {
                        source_path,
                        reason,
                    });
                }
                Err(PrepareError::Fatal(err)) => return Err(err),
            }
        }

        if loaded.is_empty() {
            return Err(PackagingError::AllItemsFailed(total).into());
        }
        if !skipped.is_empty() && !self.config.accept_partial {
            return Err(PackagingError::PartialRejected {
                skipped: skipped.len(),
                total,
            }
            .into());
        }

        let texts: Vec<String> = loaded
            .iter()
            .map(|item| manifest.items()[item.manifest_index].effective_bookmark())
            .collect();
        let sources: Vec<TocSource<'_>> = texts
            .iter()
            .zip(&loaded)
            .map(|(text, item)| TocSource {
                text,
                page_count: Some(item.page_count),
            })
            .collect();
        let plan = if self.config.toc_enabled {
            layout::plan_toc(&sources, &geometry, self.config.toc_overflow)?
        } else {
            layout::plan_without_toc(&sources, &geometry)?
        };

        let packed: Vec<PackedItem> = plan
            .entries()
            .iter()
            .zip(&loaded)
            .map(|(entry, item)| PackedItem {
                source_path: manifest.items()[item.manifest_index]
                    .source_path()
                    .to_path_buf(),
                bookmark_text: entry.text.clone(),
                start_page: entry.start_page,
                page_count: entry.page_count,
            })
            .collect();

        let documents = loaded.into_iter().map(|item| item.document).collect();
        let mut document = merge::assemble(&plan, documents)?;

        self.check_cancel(total, total)?;
        write_atomically(&mut document, output)?;

        Ok(PackReport {
            output_path: output.to_path_buf(),
            toc_pages: plan.toc_page_count(),
            total_pages: plan.total_pages(),
            packed,
            skipped,
        })
    }

    fn prepare_item(
        &self,
        manifest: &mut Manifest,
        index: usize,
        (position, total): (usize, usize),
        work_dir: &Path,
        log: &mut RunLog,
    ) -> std::result::Result<Loaded, PrepareError> {
        let item = &mut manifest.items_mut()[index];
        item.record_page_count(None);
        let source = item.source_path().to_path_buf();
        if !source.is_file() {
            return Err(PrepareError::Skip(SkipReason::Vanished));
        }

        if item.format().needs_conversion() {
            let output_dir = work_dir.join(format!("{position:04}"));
            let converted = fs::create_dir_all(&output_dir)
                .map_err(|err| ConversionError::Io {
                    path: source.clone(),
                    source: err,
                })
                .and_then(|()| self.converter.convert_to_pdf(&source, &output_dir));
            match converted {
                Ok(pdf) => {
                    log.record(LogEvent::Converted {
                        path: source.clone(),
                        pdf: pdf.clone(),
                    });
                    item.record_conversion(Some(pdf));
                }
                Err(err) if err.is_fatal() => {
                    item.record_conversion(None);
                    return Err(PrepareError::Fatal(err.into()));
                }
                Err(err) => {
                    item.record_conversion(None);
                    return Err(PrepareError::Skip(SkipReason::Conversion(err)));
                }
            }
            self.check_cancel(position, total)
                .map_err(PrepareError::Fatal)?;
        }

        let pdf = item
            .pdf_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| PrepareError::Fatal(PackagingError::MissingPdf(source.clone()).into()))?;
        let document = pages::open_document(&pdf)
            .map_err(|err| PrepareError::Skip(SkipReason::UnreadablePdf(err)))?;
        let page_count = document.get_pages().len();
        if page_count == 0 {
            return Err(PrepareError::Skip(SkipReason::UnreadablePdf(
                UnreadablePdfError::NoPages(pdf),
            )));
        }
        item.record_page_count(Some(page_count));
        log.record(LogEvent::PagesCounted {
            path: pdf,
            pages: page_count,
        });

        Ok(Loaded {
            manifest_index: index,
            document,
            page_count,
        })
    }

    fn check_cancel(&self, completed: usize, total: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled { completed, total });
        }
        Ok(())
    }
}

enum PrepareError {
    Skip(SkipReason),
    Fatal(Error),
}

fn write_atomically(document: &mut Document, output: &Path) -> std::result::Result<(), PackagingError> {
    let write_error = |source| PackagingError::Write {
        path: output.to_path_buf(),
        source,
    };
    let directory = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut file = NamedTempFile::new_in(&directory).map_err(write_error)?;
    document.save_to(&mut file).map_err(write_error)?;
    file.flush().map_err(write_error)?;
    file.persist(output).map_err(|err| write_error(err.error))?;
    Ok(())
}

/// Default package path inside `folder`: `TLFs_Merged_<YYYYmmdd_THHMM>.pdf`.
///
/// An existing file is never overwritten; `_v2`, `_v3`, ... is appended instead.
pub fn default_output_path<Tz: TimeZone>(folder: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: fmt::Display,
{
    let stem = format!("TLFs_Merged_{}", now.format("%Y%m%d_T%H%M"));
    unique_path(folder, &stem, "pdf")
}

fn unique_path(folder: &Path, stem: &str, extension: &str) -> PathBuf {
    let first = folder.join(format!("{stem}.{extension}"));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|version| folder.join(format!("{stem}_v{version}.{extension}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

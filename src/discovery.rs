//! Folder scanning.
//!
//! Files are grouped by format (RTF, then PDF, then DOCX) and sorted by file name within each
//! group, which is the order a freshly loaded folder is shown in before any sort is applied.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;
use crate::model::DocumentFormat;

/// A supported file found in the input folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Format derived from the extension.
    pub format: DocumentFormat,
}

/// Lists the supported files in `folder`, descending into sub-folders when `recursive` is set.
///
/// Office lock files (`~$name.docx`) and unsupported extensions are skipped.
pub fn discover(folder: &Path, recursive: bool) -> Result<Vec<DiscoveredFile>, DiscoveryError> {
    if !folder.exists() {
        return Err(DiscoveryError::Missing(folder.to_path_buf()));
    }
    if !folder.is_dir() {
        return Err(DiscoveryError::NotADirectory(folder.to_path_buf()));
    }
    let root = folder
        .canonicalize()
        .map_err(|source| DiscoveryError::Unreadable {
            path: folder.to_path_buf(),
            source,
        })?;

    let mut found = Vec::new();
    collect(&root, recursive, &mut found)?;
    found.sort_by(|a, b| {
        format_rank(a.format)
            .cmp(&format_rank(b.format))
            .then_with(|| sort_name(&a.path).cmp(&sort_name(&b.path)))
            .then_with(|| a.path.cmp(&b.path))
    });

    log::info!("discovered {} file(s) in {}", found.len(), root.display());
    Ok(found)
}

fn collect(
    folder: &Path,
    recursive: bool,
    found: &mut Vec<DiscoveredFile>,
) -> Result<(), DiscoveryError> {
    let unreadable = |source| DiscoveryError::Unreadable {
        path: folder.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(folder).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(unreadable)?;

        if file_type.is_dir() {
            if recursive {
                collect(&path, recursive, found)?;
            }
            continue;
        }
        if is_lock_file(&path) {
            log::debug!("skipping lock file {}", path.display());
            continue;
        }
        if let Some(format) = DocumentFormat::from_path(&path) {
            found.push(DiscoveredFile { path, format });
        }
    }
    Ok(())
}

fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with("~$"))
}

fn format_rank(format: DocumentFormat) -> u8 {
    match format {
        DocumentFormat::Rtf => 0,
        DocumentFormat::Pdf => 1,
        DocumentFormat::Docx => 2,
    }
}

fn sort_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

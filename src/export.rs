//! Manifest export.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::error::ExportError;
use crate::manifest::Manifest;

/// Column headers of the CSV export.
pub const CSV_HEADER: [&str; 9] = [
    "order_index",
    "source_path",
    "format",
    "bookmark_text",
    "included",
    "page_count",
    "title_1",
    "title_2",
    "title_3",
];

/// Writes a manifest in some external format.
pub trait ManifestExporter {
    /// Serializes every item of `manifest`, in display order, to `writer`.
    fn export<W: Write>(&self, manifest: &Manifest, writer: W) -> Result<(), ExportError>;

    /// Exports to a file at `path`, replacing it.
    fn export_to_path(&self, manifest: &Manifest, path: &Path) -> Result<(), ExportError> {
        let file = File::create(path)?;
        self.export(manifest, io::BufWriter::new(file))
    }
}

/// CSV export with one row per item.
///
/// Excluded and stale items are kept with an empty `order_index`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CsvExporter;

impl ManifestExporter for CsvExporter {
    fn export<W: Write>(&self, manifest: &Manifest, writer: W) -> Result<(), ExportError> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_HEADER)?;
        for item in manifest.items() {
            let order = item.order_index().map(|index| index.to_string()).unwrap_or_default();
            let pages = item.page_count().map(|count| count.to_string()).unwrap_or_default();
            let source = item.source_path().display().to_string();
            let title = item.title_parts();
            csv.write_record([
                order.as_str(),
                source.as_str(),
                item.format().label(),
                item.effective_bookmark().as_str(),
                if item.is_included() { "true" } else { "false" },
                pages.as_str(),
                title.primary(),
                title.secondary(),
                title.tertiary(),
            ])?;
        }
        csv.flush()?;
        log::debug!("exported {} manifest row(s)", manifest.len());
        Ok(())
    }
}

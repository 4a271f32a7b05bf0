//! The ordered working set of discovered outputs.
//!
//! The item vector is the display order. Included, non-stale items receive a contiguous
//! `order_index` starting at 0 in that order; every mutating operation renumbers, so the pack
//! order can never contain gaps or duplicates.
//!
//! Background rescans never touch the items directly. They compute a [`RescanDelta`] against a
//! [`KnownPaths`] snapshot, and the owner of the manifest applies it with
//! [`Manifest::apply_rescan`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::PackagerConfig;
use crate::discovery::{self, DiscoveredFile};
use crate::error::DiscoveryError;
use crate::extract::{self, heuristics};
use crate::model::OutputItem;

/// Paths known to a manifest, mapped to their stale flag.
pub type KnownPaths = HashMap<PathBuf, bool>;

/// Changes found by a rescan of the manifest folder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RescanDelta {
    /// Newly discovered files, titles already extracted.
    pub added: Vec<OutputItem>,
    /// Known files that are no longer on disk.
    pub vanished: Vec<PathBuf>,
    /// Stale files that reappeared.
    pub restored: Vec<PathBuf>,
}

impl RescanDelta {
    /// Returns `true` when the rescan found no change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.vanished.is_empty() && self.restored.is_empty()
    }
}

/// Rescans `folder` and reports what changed relative to `known`.
pub fn scan_delta(
    folder: &Path,
    recursive: bool,
    known: &KnownPaths,
) -> Result<RescanDelta, DiscoveryError> {
    let found = discovery::discover(folder, recursive)?;
    let on_disk: HashSet<&Path> = found.iter().map(|file| file.path.as_path()).collect();

    let mut delta = RescanDelta::default();
    for file in &found {
        match known.get(&file.path) {
            None => delta.added.push(item_for(file)),
            Some(true) => delta.restored.push(file.path.clone()),
            Some(false) => {}
        }
    }
    let mut vanished: Vec<PathBuf> = known
        .iter()
        .filter(|(path, stale)| !**stale && !on_disk.contains(path.as_path()))
        .map(|(path, _)| path.clone())
        .collect();
    vanished.sort();
    delta.vanished = vanished;

    Ok(delta)
}

fn item_for(file: &DiscoveredFile) -> OutputItem {
    let title = extract::extract_title(&file.path, file.format);
    OutputItem::new(file.path.clone(), file.format, title)
}

/// Ordered collection of [`OutputItem`]s for one folder.
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    folder: Option<PathBuf>,
    recursive: bool,
    items: Vec<OutputItem>,
}

impl Manifest {
    /// Creates an empty manifest not bound to a folder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manifest from items in the given order.
    pub fn from_items(items: impl IntoIterator<Item = OutputItem>) -> Self {
        let mut manifest = Self::new();
        for item in items {
            manifest.insert(item);
        }
        manifest.renumber();
        manifest
    }

    /// Scans `folder`, extracts every title and optionally sorts by TLF number.
    pub fn load_folder(folder: &Path, config: &PackagerConfig) -> Result<Self, DiscoveryError> {
        let found = discovery::discover(folder, config.recursive)?;
        let mut manifest = Self::from_items(found.iter().map(item_for));
        manifest.folder = Some(folder.to_path_buf());
        manifest.recursive = config.recursive;
        if config.sort_on_discovery {
            manifest.sort_by_tlf_number();
        }
        Ok(manifest)
    }

    /// Folder the manifest was loaded from.
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// All items in display order.
    pub fn items(&self) -> &[OutputItem] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [OutputItem] {
        &mut self.items
    }

    /// Number of items, including excluded and stale ones.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when the manifest holds no item.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index` in display order.
    pub fn get(&self, index: usize) -> Option<&OutputItem> {
        self.items.get(index)
    }

    /// Items that take part in packing, in pack order.
    pub fn selected(&self) -> Vec<&OutputItem> {
        let mut selected: Vec<&OutputItem> = self
            .items
            .iter()
            .filter(|item| item.order_index().is_some())
            .collect();
        selected.sort_by_key(|item| item.order_index());
        selected
    }

    /// Finds an item by full path, file name or file stem (case-insensitive for names).
    pub fn find(&self, query: &str) -> Option<usize> {
        let query_path = Path::new(query);
        if let Some(index) = self.items.iter().position(|item| item.source_path() == query_path) {
            return Some(index);
        }
        let lowered = query.to_lowercase();
        self.items
            .iter()
            .position(|item| item.file_name().to_lowercase() == lowered)
            .or_else(|| {
                self.items.iter().position(|item| {
                    item.source_path()
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().to_lowercase() == lowered)
                        .unwrap_or(false)
                })
            })
    }

    /// Swaps the item with its predecessor. Returns `false` when it is already first.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.items.len() {
            return false;
        }
        self.items.swap(index - 1, index);
        self.renumber();
        true
    }

    /// Swaps the item with its successor. Returns `false` when it is already last.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index + 1 >= self.items.len() {
            return false;
        }
        self.items.swap(index, index + 1);
        self.renumber();
        true
    }

    /// Moves the item at `from` so that it ends up at position `to`.
    pub fn move_to(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item);
        self.renumber();
        true
    }

    /// Puts the listed items first, in the given order; the rest keep their relative order.
    ///
    /// Out-of-range and repeated indices are ignored.
    pub fn reorder(&mut self, leading: &[usize]) {
        let mut taken = vec![false; self.items.len()];
        let mut order = Vec::with_capacity(self.items.len());
        for &index in leading {
            if index < self.items.len() && !taken[index] {
                taken[index] = true;
                order.push(index);
            }
        }
        order.extend((0..self.items.len()).filter(|index| !taken[*index]));

        let mut slots: Vec<Option<OutputItem>> = self.items.drain(..).map(Some).collect();
        self.items = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect();
        self.renumber();
    }

    /// Includes or excludes an item.
    pub fn set_included(&mut self, index: usize, included: bool) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        item.set_included(included);
        self.renumber();
        true
    }

    /// Replaces an item's bookmark text verbatim.
    pub fn set_bookmark_text(&mut self, index: usize, text: impl Into<String>) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        item.set_bookmark_text(text);
        true
    }

    /// Restores an item's bookmark text to the extracted title.
    pub fn reset_bookmark_text(&mut self, index: usize) -> bool {
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        let extracted = item.extracted_title().to_string();
        item.set_bookmark_text(extracted);
        true
    }

    /// Stable sort by category (tables, listings, figures, appendices) and dotted number.
    pub fn sort_by_tlf_number(&mut self) {
        self.items.sort_by_cached_key(|item| {
            let (category, numbers) = heuristics::sort_key(&item.effective_bookmark());
            (category, numbers, item.file_name().to_lowercase())
        });
        self.renumber();
    }

    /// Snapshot of the known paths, handed to background rescans.
    pub fn known_paths(&self) -> KnownPaths {
        self.items
            .iter()
            .map(|item| (item.source_path().to_path_buf(), item.is_stale()))
            .collect()
    }

    /// Applies a rescan result: appends new items and flips stale flags.
    ///
    /// Order, selection and bookmark text of existing items are left untouched.
    pub fn apply_rescan(&mut self, delta: RescanDelta) {
        let vanished: HashSet<PathBuf> = delta.vanished.into_iter().collect();
        let restored: HashSet<PathBuf> = delta.restored.into_iter().collect();
        for item in &mut self.items {
            if vanished.contains(item.source_path()) {
                log::info!("{} vanished from disk", item.source_path().display());
                item.set_stale(true);
            } else if restored.contains(item.source_path()) {
                log::info!("{} is back on disk", item.source_path().display());
                item.set_stale(false);
            }
        }
        for item in delta.added {
            log::info!("new file {}", item.source_path().display());
            self.insert(item);
        }
        self.renumber();
    }

    /// Rescans the folder the manifest was loaded from and applies the result.
    pub fn rescan(&mut self) -> Result<RescanDelta, DiscoveryError> {
        let Some(folder) = self.folder.clone() else {
            return Ok(RescanDelta::default());
        };
        let delta = scan_delta(&folder, self.recursive, &self.known_paths())?;
        self.apply_rescan(delta.clone());
        Ok(delta)
    }

    /// Drops every stale item.
    pub fn remove_stale(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item.is_stale());
        self.renumber();
        before - self.items.len()
    }

    fn insert(&mut self, item: OutputItem) {
        if self
            .items
            .iter()
            .any(|existing| existing.source_path() == item.source_path())
        {
            log::debug!("ignoring duplicate {}", item.source_path().display());
            return;
        }
        self.items.push(item);
    }

    fn renumber(&mut self) {
        let mut next = 0;
        for item in &mut self.items {
            if item.is_included() && !item.is_stale() {
                item.set_order_index(Some(next));
                next += 1;
            } else {
                item.set_order_index(None);
            }
        }
    }
}

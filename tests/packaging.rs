mod common;

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tlf_packager::config::PackagerConfig;
use tlf_packager::error::{Error, PackagingError};
use tlf_packager::manifest::Manifest;
use tlf_packager::pipeline::{CancelToken, Packager, SkipReason};
use tlf_packager::runlog::RunLog;

use common::{load_package, outline, shown_text, write_docx, write_pdf, write_rtf, FakeConverter};

fn config() -> PackagerConfig {
    PackagerConfig {
        lines_per_page: Some(20),
        sort_on_discovery: false,
        ..PackagerConfig::default()
    }
}

/// Folder with `a.pdf` (2 pages), `b.docx` and `c.rtf`, loaded in that order.
fn three_item_folder(config: &PackagerConfig) -> (TempDir, Manifest) {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_pdf(&dir.path().join("a.pdf"), 2, "Table 1: Demographics");
    write_docx(&dir.path().join("b.docx"), &["Table 2 Vital Signs", "Safety Set"]);
    write_rtf(&dir.path().join("c.rtf"), "Table 3", "Laboratory Values");

    let mut manifest = Manifest::load_folder(dir.path(), config).expect("load folder");
    let order: Vec<usize> = ["a.pdf", "b.docx", "c.rtf"]
        .iter()
        .map(|name| manifest.find(name).expect("item present"))
        .collect();
    manifest.reorder(&order);
    (dir, manifest)
}

fn converter() -> FakeConverter {
    FakeConverter::new()
        .with_pages("b.docx", 1)
        .with_pages("c.rtf", 3)
}

fn output_in(dir: &TempDir) -> PathBuf {
    dir.path().join("out").join("package.pdf")
}

fn prepare_output(path: &Path) {
    fs::create_dir_all(path.parent().expect("output parent")).expect("create output folder");
}

#[test]
fn toc_numbers_and_bookmarks_point_at_the_same_pages() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter();
    let mut log = RunLog::new();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut log)
        .expect("pack");

    assert!(report.is_complete());
    assert_eq!(report.toc_pages, 1);
    assert_eq!(report.total_pages, 7);
    let starts: Vec<usize> = report.packed.iter().map(|item| item.start_page).collect();
    assert_eq!(starts, vec![2, 4, 5]);

    let package = load_package(&output);
    assert_eq!(package.get_pages().len(), 7);

    let bookmarks = outline(&package);
    let bookmark_pages: Vec<u32> = bookmarks.iter().map(|(_, page)| *page).collect();
    assert_eq!(bookmark_pages, vec![2, 4, 5]);
    assert!(bookmarks[0].0.starts_with("Table 1"));
    assert!(bookmarks[1].0.starts_with("Table 2"));
    assert!(bookmarks[2].0.starts_with("Table 3"));

    let toc_text = shown_text(&package, 1);
    for ((title, page), item) in bookmarks.iter().zip(&report.packed) {
        assert_eq!(title, &item.bookmark_text);
        let position = toc_text
            .iter()
            .position(|text| text == title)
            .expect("entry text on TOC page");
        assert_eq!(toc_text[position + 1], page.to_string());
    }

    let counted: Vec<Option<usize>> = manifest.selected().iter().map(|item| item.page_count()).collect();
    assert_eq!(counted, vec![Some(2), Some(1), Some(3)]);
    assert!(log.skipped().next().is_none());
}

#[test]
fn failed_conversion_is_skipped_and_later_items_move_up() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter().failing("b.docx");
    let mut log = RunLog::new();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut log)
        .expect("partial pack");

    assert_eq!(report.packed.len(), 2);
    let starts: Vec<usize> = report.packed.iter().map(|item| item.start_page).collect();
    assert_eq!(starts, vec![2, 4]);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].source_path.ends_with("b.docx"));
    assert!(matches!(report.skipped[0].reason, SkipReason::Conversion(_)));
    assert_eq!(log.skipped().count(), 1);

    let package = load_package(&output);
    assert_eq!(package.get_pages().len(), 6);
    let pages: Vec<u32> = outline(&package).iter().map(|(_, page)| *page).collect();
    assert_eq!(pages, vec![2, 4]);
}

#[test]
fn edited_bookmark_text_is_used_verbatim() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let index = manifest.find("c.rtf").expect("c.rtf");
    let edited = "Table 3.1 (edited): Chemistry, Haematology & Urinalysis";
    manifest.set_bookmark_text(index, edited);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter();

    Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .expect("pack");

    let package = load_package(&output);
    let bookmarks = outline(&package);
    assert_eq!(bookmarks[2], (edited.to_string(), 5));
    assert!(shown_text(&package, 1).iter().any(|text| text == edited));
}

#[test]
fn excluded_items_are_left_out() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let index = manifest.find("a.pdf").expect("a.pdf");
    manifest.set_included(index, false);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .expect("pack");

    let starts: Vec<usize> = report.packed.iter().map(|item| item.start_page).collect();
    assert_eq!(starts, vec![2, 3]);
    assert_eq!(report.total_pages, 5);
}

#[test]
fn without_toc_content_starts_on_page_one() {
    let config = PackagerConfig {
        toc_enabled: false,
        ..config()
    };
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .expect("pack");

    assert_eq!(report.toc_pages, 0);
    let pages: Vec<u32> = outline(&load_package(&output))
        .iter()
        .map(|(_, page)| *page)
        .collect();
    assert_eq!(pages, vec![1, 3, 4]);
}

#[test]
fn one_entry_more_than_a_page_holds_adds_a_toc_page() {
    let dir = tempfile::tempdir().expect("create temp dir");
    for number in 1..=5 {
        write_pdf(
            &dir.path().join(format!("t_{number:02}.pdf")),
            1,
            &format!("Table {number}"),
        );
    }
    let config = PackagerConfig {
        lines_per_page: Some(4),
        ..config()
    };
    let mut manifest = Manifest::load_folder(dir.path(), &config).expect("load folder");
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = FakeConverter::new();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .expect("pack");

    assert_eq!(report.toc_pages, 2);
    assert_eq!(report.packed[0].start_page, 3);
    let package = load_package(&output);
    assert_eq!(package.get_pages().len(), 7);
    assert_eq!(shown_text(&package, 2)[1], "7");
}

#[test]
fn strict_mode_rejects_partial_packages() {
    let config = PackagerConfig {
        accept_partial: false,
        ..config()
    };
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter().failing("c.rtf");

    let err = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Packaging(PackagingError::PartialRejected {
            skipped: 1,
            total: 3
        })
    ));
    assert!(!output.exists());
}

#[test]
fn every_item_failing_writes_nothing() {
    let config = config();
    let dir = tempfile::tempdir().expect("create temp dir");
    write_docx(&dir.path().join("b.docx"), &["Table 2"]);
    write_rtf(&dir.path().join("c.rtf"), "Table 3", "Labs");
    let mut manifest = Manifest::load_folder(dir.path(), &config).expect("load folder");
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = FakeConverter::new().failing("b.docx").failing("c.rtf");

    let err = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .unwrap_err();

    assert!(matches!(err, Error::Packaging(PackagingError::AllItemsFailed(2))));
    assert!(!output.exists());
}

#[test]
fn unavailable_converter_aborts_the_run() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = FakeConverter::unavailable();

    let err = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .unwrap_err();

    assert!(matches!(err, Error::Conversion(_)));
    assert!(!output.exists());
}

#[test]
fn nothing_selected_is_rejected() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    for index in 0..manifest.len() {
        manifest.set_included(index, false);
    }
    let output = output_in(&dir);
    let converter = converter();

    let err = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .unwrap_err();

    assert!(matches!(err, Error::Packaging(PackagingError::NothingToPack)));
}

#[test]
fn vanished_source_is_skipped() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    fs::remove_file(dir.path().join("a.pdf")).expect("remove a.pdf");
    let output = output_in(&dir);
    prepare_output(&output);
    let converter = converter();

    let report = Packager::new(&config, &converter)
        .pack(&mut manifest, &output, &mut RunLog::new())
        .expect("pack");

    assert_eq!(report.packed.len(), 2);
    assert!(matches!(report.skipped[0].reason, SkipReason::Vanished));
    assert_eq!(report.packed[0].start_page, 2);
}

#[test]
fn cancellation_leaves_no_output() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let output = output_in(&dir);
    prepare_output(&output);
    let token = CancelToken::new();
    let converter = converter().cancelling(token.clone());
    let mut log = RunLog::new();

    let err = Packager::new(&config, &converter)
        .with_cancel_token(token)
        .pack(&mut manifest, &output, &mut log)
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled { total: 3, .. }));
    assert!(!output.exists());
    let leftovers = fs::read_dir(output.parent().expect("output parent"))
        .expect("read output folder")
        .count();
    assert_eq!(leftovers, 0);
}

fn scrub_pdf(bytes: &[u8]) -> Vec<u8> {
    let mut normalized = bytes.to_vec();
    let tag = b"/ID[";
    let mut index = 0;
    while index + tag.len() < normalized.len() {
        if normalized[index..].starts_with(tag) {
            let mut cursor = index + tag.len();
            while cursor < normalized.len() && normalized[cursor] != b']' {
                if !matches!(normalized[cursor], b'<' | b'>' | b' ' | b'\n' | b'\r' | b'\t') {
                    normalized[cursor] = b'0';
                }
                cursor += 1;
            }
            index = cursor;
        } else {
            index += 1;
        }
    }
    normalized
}

fn hash_pdf(bytes: &[u8]) -> String {
    let digest = Sha256::digest(scrub_pdf(bytes));
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[test]
fn packing_twice_produces_identical_bytes() {
    let config = config();
    let (dir, mut manifest) = three_item_folder(&config);
    let converter = converter();
    let first = dir.path().join("first.pdf");
    let second = dir.path().join("second.pdf");

    Packager::new(&config, &converter)
        .pack(&mut manifest, &first, &mut RunLog::new())
        .expect("first pack");
    Packager::new(&config, &converter)
        .pack(&mut manifest, &second, &mut RunLog::new())
        .expect("second pack");

    let first_bytes = fs::read(&first).expect("read first");
    let second_bytes = fs::read(&second).expect("read second");
    assert_eq!(hash_pdf(&first_bytes), hash_pdf(&second_bytes));
}

use std::error::Error;
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Args, Parser, Subcommand};
use tlf_packager::config::PackagerConfig;
use tlf_packager::convert::OfficeConverter;
use tlf_packager::export::{CsvExporter, ManifestExporter};
use tlf_packager::manifest::Manifest;
use tlf_packager::pipeline::{self, CancelToken, Packager};
use tlf_packager::runlog::RunLog;
use tlf_packager::watch::{FolderWatcher, WatchEvent};

/// Packs clinical-trial tables, listings and figures into one bookmarked PDF.
#[derive(Parser)]
#[command(author, version, about = "Extract TLF titles and pack them into one PDF")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FolderArgs {
    /// Folder holding the RTF, DOCX and PDF outputs.
    folder: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Descend into sub-folders.
    #[arg(long)]
    recursive: bool,

    /// Keep discovery order instead of sorting by TLF number.
    #[arg(long)]
    no_sort: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the manifest of a folder.
    Scan(FolderArgs),

    /// Write the manifest of a folder as CSV.
    Export {
        #[command(flatten)]
        folder: FolderArgs,

        /// Target CSV file.
        csv: PathBuf,
    },

    /// Convert, lay out and write the package.
    Pack {
        #[command(flatten)]
        folder: FolderArgs,

        /// Output PDF; defaults to `TLFs_Merged_<date>_T<time>.pdf` in the folder.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Items to place first, in this order (path, file name or stem).
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,

        /// Items to leave out (path, file name or stem).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Bookmark override as `NAME=TEXT`.
        #[arg(long, value_parser = parse_bookmark)]
        bookmark: Vec<(String, String)>,

        /// Skip the table of contents.
        #[arg(long)]
        no_toc: bool,

        /// Abort instead of writing a package when any item fails.
        #[arg(long)]
        strict: bool,

        /// Converter command line, e.g. `soffice`.
        #[arg(long)]
        converter: Option<String>,
    },

    /// Report files added to or removed from a folder until interrupted.
    Watch(FolderArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan(args) => scan(&args),
        Commands::Export { folder, csv } => export(&folder, &csv),
        Commands::Pack {
            folder,
            output,
            order,
            exclude,
            bookmark,
            no_toc,
            strict,
            converter,
        } => {
            let options = PackOptions {
                output,
                order,
                exclude,
                bookmarks: bookmark,
                no_toc,
                strict,
                converter,
            };
            pack(&folder, options)
        }
        Commands::Watch(args) => watch(&args),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}

fn parse_bookmark(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(name, text)| (name.trim().to_string(), text.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=TEXT, got `{value}`"))
}

fn load_config(args: &FolderArgs) -> Result<PackagerConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => PackagerConfig::load(path)?,
        None => PackagerConfig::default(),
    };
    if args.recursive {
        config.recursive = true;
    }
    if args.no_sort {
        config.sort_on_discovery = false;
    }
    Ok(config)
}

fn load_manifest(args: &FolderArgs, config: &PackagerConfig) -> Result<Manifest, Box<dyn Error>> {
    let manifest = Manifest::load_folder(&args.folder, config)?;
    log::info!(
        "{} item(s) found in {}",
        manifest.len(),
        args.folder.display()
    );
    Ok(manifest)
}

fn print_manifest(manifest: &Manifest) {
    for item in manifest.items() {
        let order = item
            .order_index()
            .map(|index| format!("{:>3}", index + 1))
            .unwrap_or_else(|| "  -".to_string());
        let marker = if item.is_stale() { " (missing)" } else { "" };
        println!(
            "{order}  {:<4}  {:<40}  {}{marker}",
            item.format(),
            item.file_name(),
            item.effective_bookmark()
        );
    }
}

fn scan(args: &FolderArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(args)?;
    let manifest = load_manifest(args, &config)?;
    print_manifest(&manifest);
    Ok(())
}

fn export(args: &FolderArgs, csv: &Path) -> Result<(), Box<dyn Error>> {
    let config = load_config(args)?;
    let manifest = load_manifest(args, &config)?;
    CsvExporter.export_to_path(&manifest, csv)?;
    println!("Wrote {}", csv.display());
    Ok(())
}

struct PackOptions {
    output: Option<PathBuf>,
    order: Vec<String>,
    exclude: Vec<String>,
    bookmarks: Vec<(String, String)>,
    no_toc: bool,
    strict: bool,
    converter: Option<String>,
}

fn lookup(manifest: &Manifest, name: &str) -> Result<usize, Box<dyn Error>> {
    manifest
        .find(name)
        .ok_or_else(|| format!("no item matches `{name}`").into())
}

fn pack(args: &FolderArgs, options: PackOptions) -> Result<(), Box<dyn Error>> {
    let mut config = load_config(args)?;
    if options.no_toc {
        config.toc_enabled = false;
    }
    if options.strict {
        config.accept_partial = false;
    }
    if let Some(converter) = options.converter {
        config.converter_program = converter;
    }

    let mut manifest = load_manifest(args, &config)?;
    let leading = options
        .order
        .iter()
        .map(|name| lookup(&manifest, name))
        .collect::<Result<Vec<_>, _>>()?;
    if !leading.is_empty() {
        manifest.reorder(&leading);
    }
    for name in &options.exclude {
        let index = lookup(&manifest, name)?;
        manifest.set_included(index, false);
    }
    for (name, text) in &options.bookmarks {
        let index = lookup(&manifest, name)?;
        manifest.set_bookmark_text(index, text.clone());
    }

    let output = match options.output {
        Some(path) => path,
        None => pipeline::default_output_path(&args.folder, &chrono::Local::now()),
    };
    let converter = OfficeConverter::new(&config.converter_program, config.conversion_timeout());
    let mut log = RunLog::new();
    log.record_manifest(&manifest);

    let cancel = CancelToken::new();
    cancel_on_interrupt(cancel.clone());

    let report = Packager::new(&config, &converter)
        .with_cancel_token(cancel)
        .pack(&mut manifest, &output, &mut log)?;
    for item in &report.packed {
        println!(
            "{:>5}  {:>4}p  {}",
            item.start_page, item.page_count, item.bookmark_text
        );
    }
    for skipped in &report.skipped {
        eprintln!("skipped {}: {}", skipped.source_path.display(), skipped.reason);
    }
    println!(
        "Wrote {} ({} TOC page(s), {} page(s) total)",
        report.output_path.display(),
        report.toc_pages,
        report.total_pages
    );
    Ok(())
}

/// Cancels `token` on the first Ctrl-C; the packager stops before the next item.
fn cancel_on_interrupt(token: CancelToken) {
    let spawned = thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::warn!("Ctrl-C handling unavailable: {err}");
                    return;
                }
            };
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    log::warn!("interrupted, stopping after the current item");
                    token.cancel();
                }
                Err(err) => log::warn!("failed to listen for Ctrl-C: {err}"),
            }
        });
    if let Err(err) = spawned {
        log::warn!("Ctrl-C handling unavailable: {err}");
    }
}

fn watch(args: &FolderArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(args)?;
    let mut manifest = load_manifest(args, &config)?;
    print_manifest(&manifest);

    let folder = manifest
        .folder()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| args.folder.clone());
    let watcher = FolderWatcher::spawn(
        folder,
        config.recursive,
        manifest.known_paths(),
        config.auto_refresh_interval(),
    );
    for event in watcher.events().iter() {
        match event {
            WatchEvent::Changed(delta) => {
                manifest.apply_rescan(delta);
                println!();
                print_manifest(&manifest);
            }
            WatchEvent::Failed(err) => log::warn!("rescan failed: {err}"),
        }
    }
    Ok(())
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use quill_config::{Config, Loader};
use quill_library::{Library, Preview, RunSummary, Selection};
use quill_storage::BackendHandle;
use quill_storage::backend::{LocalBackend, ReadOnlyBackend};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Reconcile handwritten-note archives with a document library.
#[derive(Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    /// Extra configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Library root directory (overrides the configured one)
    #[arg(short, long, global = true, env = "QUILL_LIBRARY")]
    library: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show what an import of an archive would change
    Analyze {
        /// Path to the archive
        archive: PathBuf,
    },
    /// Import pages from an archive
    Import(ImportArgs),
    /// Force pages of a book to be reimported on the next run
    Reset {
        /// Book name
        book: String,
        /// Pages to reset (all pages if omitted)
        #[arg(long, value_delimiter = ',')]
        pages: Option<Vec<u32>>,
    },
    /// Rewrite the index document of a book from its manifest
    Index {
        /// Book name
        book: String,
    },
}

#[derive(Args)]
struct ImportArgs {
    /// Path to the archive
    archive: PathBuf,

    /// Which pages to import by change kind
    #[arg(long, value_enum, default_value_t = SelectArg::Changed, conflicts_with_all = ["pages", "range"])]
    select: SelectArg,

    /// Explicit page numbers, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with = "range")]
    pages: Option<Vec<u32>>,

    /// Inclusive page range, e.g. 2-8
    #[arg(long, value_parser = parse_range)]
    range: Option<(u32, u32)>,

    /// Analyze and report without writing anything to the library
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SelectArg {
    New,
    Modified,
    /// New and modified pages
    Changed,
    All,
}

impl ImportArgs {
    fn selection(&self) -> Selection {
        if let Some(pages) = &self.pages {
            return Selection::Pages(pages.iter().copied().collect::<BTreeSet<_>>());
        }
        if let Some((start, end)) = self.range {
            return Selection::Range(start, end);
        }
        match self.select {
            SelectArg::New => Selection::New,
            SelectArg::Modified => Selection::Modified,
            SelectArg::Changed => Selection::NewAndModified,
            SelectArg::All => Selection::All,
        }
    }
}

fn parse_range(value: &str) -> std::result::Result<(u32, u32), String> {
    let (start, end) = value.split_once('-').ok_or_else(|| format!("expected START-END, got {value:?}"))?;
    let start: u32 = start.trim().parse().map_err(|e| format!("invalid range start: {e}"))?;
    let end: u32 = end.trim().parse().map_err(|e| format!("invalid range end: {e}"))?;
    if start == 0 || end < start {
        return Err(format!("invalid page range {value:?}"));
    }
    Ok((start, end))
}

/// Exn errors carry their whole chain in their debug output.
fn report<E: std::fmt::Debug>(err: E) -> miette::Report {
    miette!("{err:?}")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();

    let mut loader = Loader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    let config = loader.load().map_err(report)?;
    let dry_run = matches!(&cli.command, Command::Import(args) if args.dry_run);
    let library = open_library(config, cli.library.as_deref(), dry_run)?;

    match cli.command {
        Command::Analyze { archive } => {
            let (bytes, file_name) = read_archive(&archive)?;
            let preview = library.analyze(&bytes, &file_name).await.map_err(report)?;
            print_preview(&preview);
        },
        Command::Import(args) => {
            let (bytes, file_name) = read_archive(&args.archive)?;
            if args.dry_run {
                let preview = library.analyze(&bytes, &file_name).await.map_err(report)?;
                print_preview(&preview);
            }
            let summary = library.run(&bytes, &file_name, &args.selection()).await.map_err(report)?;
            print_summary(&summary, args.dry_run);
            if !summary.errors.is_empty() {
                return Err(miette!("{} of {} pages failed to import", summary.errors.len(), summary.total_requested));
            }
        },
        Command::Reset { book, pages } => {
            let reset = library.reset(&book, pages.as_deref()).await.map_err(report)?;
            println!("Reset {} page(s) of {book}", reset.len());
        },
        Command::Index { book } => {
            let path = library.rebuild_index(&book).await.map_err(report)?;
            println!("Wrote {}", path.display());
        },
    }
    Ok(())
}

fn open_library(config: Config, root: Option<&Path>, dry_run: bool) -> Result<Library> {
    let root = root
        .map(Path::to_path_buf)
        .or_else(|| config.library.clone())
        .ok_or_else(|| miette!("no library configured; pass --library or set `library` in the config file"))?;
    let root = if root.is_absolute() { root } else { std::env::current_dir().into_diagnostic()?.join(root) };
    let local: BackendHandle = Arc::new(LocalBackend::new("library", &root).map_err(report)?);
    let backend: BackendHandle = if dry_run { Arc::new(ReadOnlyBackend::new(local)) } else { local };
    tracing::debug!(root = %root.display(), dry_run, "Opened library");
    Library::new(backend, config).map_err(report)
}

fn read_archive(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = std::fs::read(path).into_diagnostic()?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| miette!("not an archive file: {}", path.display()))?;
    Ok((bytes, file_name))
}

fn print_preview(preview: &Preview) {
    println!("{} ({}, manifest {})", preview.book.name, preview.book.source, preview.state);
    for change in preview.analysis.changes() {
        let audio = if change.audio_changed { "  audio changed" } else { "" };
        println!("  page {:>3}  {:<9}{audio}", change.page, change.kind.to_string());
    }
    let counts = preview.analysis.counts();
    println!(
        "{} new, {} modified, {} unchanged, {} deleted",
        counts.new, counts.modified, counts.unchanged, counts.deleted
    );
    if counts.deleted > 0 {
        println!("Deleted pages keep their documents and records.");
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let verb = if dry_run { "Would import" } else { "Imported" };
    println!("{verb} {} of {} selected page(s) of {}", summary.imported, summary.total_requested, summary.book);
    if let Some(backup) = &summary.backup {
        println!("Manifest backed up to {}", backup.display());
    }
    for error in &summary.errors {
        println!("  page {:>3}  failed: {}", error.page, error.message);
    }
}

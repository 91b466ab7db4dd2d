//! Import runs: decode, reconcile against the manifest, materialize, persist.

use crate::analyze::{ChangeAnalysis, analyze, collect_embedded};
use crate::error::{ErrorKind, Result};
use crate::import::{Context, PageError, import_pages};
use crate::index::write_index;
use crate::layout::BookLayout;
use crate::recover::recover;
use crate::reduce::reduce;
use crate::select::{SelectionResolver, normalize};
use crate::templates::Renderer;
use crate::transcribe::Transcriber;
use derive_more::Display;
use exn::ResultExt;
use quill_archive::{AudioResolver, Book, DecodeOptions, decode_bytes};
use quill_config::Config;
use quill_manifest::{Action, HistoryEntry, Manifest, ManifestStore};
use quill_storage::BackendHandle;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::instrument;

/// Books with a run in progress.
///
/// Cloning shares the registry, so several [`Library`] values can guard the
/// same books.
#[derive(Clone, Debug, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `book` for the lifetime of the returned guard. Fails with
    /// [`ErrorKind::RunInProgress`] if it is already claimed; requests are
    /// never queued.
    ///
    /// Books are claimed by library folder, so names that map to the same
    /// folder exclude each other.
    pub fn try_acquire(&self, book: &str) -> Result<RunGuard> {
        let key = Self::key(book);
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(key.clone()) {
            exn::bail!(ErrorKind::RunInProgress(book.to_string()));
        }
        Ok(RunGuard { active: Arc::clone(&self.active), book: key })
    }

    pub fn is_running(&self, book: &str) -> bool {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).contains(&Self::key(book))
    }

    fn key(book: &str) -> String {
        BookLayout::new(book).folder().to_string_lossy().into_owned()
    }
}

/// Releases its book when dropped.
#[derive(Debug)]
pub struct RunGuard {
    active: Arc<Mutex<HashSet<String>>>,
    book: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.book);
    }
}

/// Where the manifest a run reconciled against came from.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ManifestState {
    #[display("loaded")]
    Loaded,
    /// Rebuilt from the page documents in the library.
    #[display("recovered")]
    Recovered,
    /// First import of this book.
    #[display("absent")]
    Absent,
}

/// Result of [`Library::analyze`]: what a run would find, without writing
/// anything.
#[derive(Debug)]
pub struct Preview {
    pub book: Book,
    pub analysis: ChangeAnalysis,
    pub state: ManifestState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub book: String,
    pub state: ManifestState,
    /// Pages selected for import.
    pub total_requested: usize,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Pages materialized successfully.
    pub imported: usize,
    pub errors: Vec<PageError>,
    /// Manifest backup taken before the manifest was rewritten.
    pub backup: Option<PathBuf>,
    pub artifacts_written: usize,
}

impl RunSummary {
    fn new(book: &str, state: ManifestState, analysis: &ChangeAnalysis) -> Self {
        let counts = analysis.counts();
        Self {
            book: book.to_string(),
            state,
            total_requested: 0,
            new: counts.new,
            modified: counts.modified,
            unchanged: counts.unchanged,
            deleted: counts.deleted,
            imported: 0,
            errors: Vec::new(),
            backup: None,
            artifacts_written: 0,
        }
    }
}

/// Imports archives into one library (a storage backend plus settings).
pub struct Library {
    backend: BackendHandle,
    config: Config,
    store: ManifestStore,
    renderer: Renderer,
    registry: RunRegistry,
    resolver: AudioResolver,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Library {
    pub fn new(backend: BackendHandle, config: Config) -> Result<Self> {
        let store = ManifestStore::new(backend.clone()).with_backup(config.manifest.backup);
        Ok(Self {
            backend,
            config,
            store,
            renderer: Renderer::new()?,
            registry: RunRegistry::new(),
            resolver: AudioResolver::default(),
            transcriber: None,
        })
    }

    /// Used for pages when `import.transcribe` is enabled.
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_audio_resolver(mut self, resolver: AudioResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_registry(mut self, registry: RunRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn decode(&self, archive: &[u8], file_name: &str) -> Result<Book> {
        let options = DecodeOptions {
            strokes: self.config.import.strokes,
            audio: self.config.import.audio,
            resolver: self.resolver.clone(),
        };
        decode_bytes(archive, file_name, &options).or_raise(|| ErrorKind::Decode)
    }

    async fn load(&self, layout: &BookLayout) -> Result<Option<Manifest>> {
        self.store.load(&layout.manifest_path()).await.or_raise(|| ErrorKind::Manifest)
    }

    async fn recover(&self, layout: &BookLayout, book: &Book, now: OffsetDateTime) -> Result<Option<Manifest>> {
        let background = self.config.import.background().to_string();
        let history_limit = self.config.manifest.history_limit;
        recover(&self.backend, layout, &book.source, &background, now, history_limit).await
    }

    /// Decodes the archive and analyzes it against the library, without
    /// writing anything. A lost manifest is recovered in memory only.
    #[instrument(skip(self, archive), fields(bytes = archive.len()))]
    pub async fn analyze(&self, archive: &[u8], file_name: &str) -> Result<Preview> {
        let book = self.decode(archive, file_name)?;
        let layout = BookLayout::new(&book.name);
        let (manifest, state) = match self.load(&layout).await? {
            Some(manifest) => (Some(manifest), ManifestState::Loaded),
            None => match self.recover(&layout, &book, OffsetDateTime::now_utc()).await? {
                Some(manifest) => (Some(manifest), ManifestState::Recovered),
                None => (None, ManifestState::Absent),
            },
        };
        let analysis = self.reconcile(&layout, &book, manifest.as_ref()).await;
        Ok(Preview { book, analysis, state })
    }

    async fn reconcile(&self, layout: &BookLayout, book: &Book, manifest: Option<&Manifest>) -> ChangeAnalysis {
        let embedded = match manifest {
            Some(manifest) => collect_embedded(&self.backend, layout, manifest).await,
            None => Default::default(),
        };
        analyze(book, manifest, &embedded)
    }

    /// Imports the pages `selection` picks from the archive.
    ///
    /// Fails only if the archive can't be decoded, the manifest can't be
    /// read or written, or the book is already being imported. Failed pages
    /// are listed in the summary instead.
    #[instrument(skip(self, archive, selection), fields(bytes = archive.len(), book))]
    pub async fn run(&self, archive: &[u8], file_name: &str, selection: &dyn SelectionResolver) -> Result<RunSummary> {
        let book = self.decode(archive, file_name)?;
        tracing::Span::current().record("book", book.name.as_str());
        let _guard = self.registry.try_acquire(&book.name)?;
        let now = OffsetDateTime::now_utc();
        let layout = BookLayout::new(&book.name);
        let manifest_path = layout.manifest_path();

        let (manifest, state) = match self.load(&layout).await? {
            Some(manifest) => (Some(manifest), ManifestState::Loaded),
            None => match self.recover(&layout, &book, now).await? {
                Some(manifest) => {
                    self.store.save(&manifest_path, &manifest).await.or_raise(|| ErrorKind::Manifest)?;
                    (Some(manifest), ManifestState::Recovered)
                },
                None => (None, ManifestState::Absent),
            },
        };
        tracing::info!(%state, pages = book.len(), "Reconciling");

        let analysis = self.reconcile(&layout, &book, manifest.as_ref()).await;
        let mut summary = RunSummary::new(&book.name, state, &analysis);
        let selected = normalize(&book, selection.select(&book, &analysis));
        summary.total_requested = selected.len();
        if selected.is_empty() {
            tracing::info!("Nothing selected");
            return Ok(summary);
        }

        if manifest.is_some() {
            summary.backup = self.backup(&manifest_path, now).await;
        }

        let settings = &self.config.import;
        let ctx = Context {
            backend: &self.backend,
            layout: &layout,
            renderer: &self.renderer,
            settings,
            transcriber: self.transcriber.as_deref().filter(|_| settings.transcribe),
            now,
        };
        let report = import_pages(&ctx, &book, &analysis, &selected, manifest.as_ref()).await;

        let mut base = manifest.unwrap_or_else(|| Manifest::new(&book.name, &book.source));
        base.book.clone_from(&book.name);
        base.source.clone_from(&book.source);
        base.total_pages = book.page_numbers().into_iter().max().unwrap_or_default();
        let updated = reduce(base, &report, Action::Import, now, self.config.manifest.history_limit);
        self.store.save(&manifest_path, &updated).await.or_raise(|| ErrorKind::Manifest)?;
        if let Err(err) = write_index(&self.backend, &self.renderer, &updated, &layout).await {
            tracing::warn!(error = ?err, "Could not write index");
        }

        summary.imported = report.outcomes.len();
        summary.artifacts_written = report.artifacts_written();
        summary.errors = report.errors;
        tracing::info!(
            imported = summary.imported,
            failed = summary.errors.len(),
            artifacts = summary.artifacts_written,
            "Run complete"
        );
        Ok(summary)
    }

    /// Invalidates the fingerprints of `pages` (every page when `None`) so
    /// the next import rewrites them. Returns the pages that were reset.
    #[instrument(skip(self))]
    pub async fn reset(&self, book: &str, pages: Option<&[u32]>) -> Result<Vec<u32>> {
        let layout = BookLayout::new(book);
        let _guard = self.registry.try_acquire(book)?;
        let path = layout.manifest_path();
        let Some(mut manifest) = self.load(&layout).await? else {
            exn::bail!(ErrorKind::UnknownBook(book.to_string()));
        };
        let now = OffsetDateTime::now_utc();
        let reset = manifest.reset_pages(pages, now);
        if reset.is_empty() {
            return Ok(reset);
        }
        self.backup(&path, now).await;
        let summary = format!("reset {} pages", reset.len());
        manifest.record_history(
            HistoryEntry { timestamp: now, action: Action::Reset, pages: reset.clone(), summary },
            self.config.manifest.history_limit,
        );
        self.store.save(&path, &manifest).await.or_raise(|| ErrorKind::Manifest)?;
        tracing::info!(pages = reset.len(), "Reset pages");
        Ok(reset)
    }

    /// Re-renders the index document from the persisted manifest.
    #[instrument(skip(self))]
    pub async fn rebuild_index(&self, book: &str) -> Result<PathBuf> {
        let layout = BookLayout::new(book);
        let Some(manifest) = self.load(&layout).await? else {
            exn::bail!(ErrorKind::UnknownBook(book.to_string()));
        };
        write_index(&self.backend, &self.renderer, &manifest, &layout).await
    }

    /// A failed backup doesn't stop the run.
    async fn backup(&self, path: &Path, now: OffsetDateTime) -> Option<PathBuf> {
        match self.store.backup(path, now).await {
            Ok(backup) => backup,
            Err(err) => {
                tracing::warn!(error = ?err, "Could not back up manifest");
                None
            },
        }
    }
}

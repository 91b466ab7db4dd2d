//! Materialization of selected pages into the library.
//!
//! Pages run in batches: every page of a batch concurrently, one batch after
//! the other with a short pause in between so the host stays responsive.
//! Each page is an independent unit of work; a failure is recorded against
//! that page and the others carry on. Nothing here touches the manifest,
//! outcomes are folded into it afterwards by [`reduce()`](crate::reduce()).

pub mod error;
mod page;

use self::page::import_page;
use crate::analyze::{ChangeAnalysis, ChangeKind};
use crate::layout::BookLayout;
use crate::templates::Renderer;
use crate::transcribe::Transcriber;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use quill_archive::Book;
use quill_config::ImportConfig;
use quill_manifest::{Manifest, PageRecord};
use quill_storage::BackendHandle;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::instrument;

/// Everything a page import needs besides the page itself.
pub struct Context<'a> {
    pub backend: &'a BackendHandle,
    pub layout: &'a BookLayout,
    pub renderer: &'a Renderer,
    pub settings: &'a ImportConfig,
    /// Only set when transcription is enabled.
    pub transcriber: Option<&'a dyn Transcriber>,
    pub now: OffsetDateTime,
}

/// A page that was materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: u32,
    /// `New`, `Modified` or `Unchanged`.
    pub status: ChangeKind,
    pub record: PageRecord,
    /// Artifacts (not documents) that were actually written.
    pub artifacts_written: Vec<PathBuf>,
}

/// A page that failed. Its manifest record stays as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageError {
    pub page: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Sorted by page number.
    pub outcomes: Vec<PageOutcome>,
    /// Sorted by page number.
    pub errors: Vec<PageError>,
}

impl ImportReport {
    pub fn artifacts_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.artifacts_written.len()).sum()
    }

    pub fn count(&self, status: ChangeKind) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Every page that was attempted, successful or not, sorted.
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> =
            self.outcomes.iter().map(|o| o.page).chain(self.errors.iter().map(|e| e.page)).collect();
        pages.sort_unstable();
        pages
    }
}

/// Materializes the `selected` pages of `book`.
///
/// Selected numbers the book doesn't have are ignored.
#[instrument(skip_all, fields(book = %book.name, pages = selected.len()))]
pub async fn import_pages(
    ctx: &Context<'_>,
    book: &Book,
    analysis: &ChangeAnalysis,
    selected: &[u32],
    manifest: Option<&Manifest>,
) -> ImportReport {
    let mut report = ImportReport::default();
    if let Err(err) = ctx.backend.ensure_dir(ctx.layout.folder()).await {
        tracing::warn!(error = ?err, "Could not create book folder");
    }

    let pages: Vec<_> = selected.iter().filter_map(|n| book.page(*n)).collect();
    let batch_size = ctx.settings.batch_size.max(1);
    for (index, batch) in pages.chunks(batch_size).enumerate() {
        if index > 0 {
            let pause = ctx.settings.batch_pause();
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        }
        tracing::debug!(batch = index + 1, pages = batch.len(), "Importing batch");

        let mut running: FuturesUnordered<_> = batch
            .iter()
            .map(|page| {
                let previous = manifest.and_then(|m| m.page(page.number));
                let status = match (analysis.kind(page.number), previous) {
                    (Some(kind @ (ChangeKind::New | ChangeKind::Modified | ChangeKind::Unchanged)), _) => kind,
                    (_, None) => ChangeKind::New,
                    (_, Some(_)) => ChangeKind::Modified,
                };
                async move { (page.number, import_page(ctx, book, page, status, previous).await) }
            })
            .collect();
        while let Some((number, result)) = running.next().await {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(err) => {
                    tracing::warn!(page = number, error = ?err, "Page import failed");
                    report.errors.push(PageError { page: number, message: (*err).to_string() });
                },
            }
        }
    }

    report.outcomes.sort_by_key(|o| o.page);
    report.errors.sort_by_key(|e| e.page);
    tracing::info!(
        imported = report.outcomes.len(),
        failed = report.errors.len(),
        artifacts = report.artifacts_written(),
        "Import finished"
    );
    report
}

//! Rebuilding a lost manifest from the page documents already in the
//! library.
//!
//! Recovered records can't know what the original bitmaps hashed to, so
//! their fingerprints are [`Recovered`](Fingerprint::Recovered)
//! placeholders. The digests embedded in the documents themselves still let
//! the next analysis recognise unchanged pages.

use crate::compose::ARTIFACT_EXTENSION;
use crate::document;
use crate::error::{ErrorKind, Result};
use crate::layout::BookLayout;
use exn::ResultExt;
use quill_archive::Fingerprint;
use quill_manifest::{Action, HistoryEntry, Manifest, PageRecord};
use quill_storage::{BackendHandle, FileInfo};
use tracing::instrument;

/// Scans the book folder for page documents and builds a manifest from
/// them. Returns `None` when there are none.
///
/// `background` is recorded as the setting the artifacts were written with.
#[instrument(skip(backend, layout, now), fields(book = layout.name()))]
pub async fn recover(
    backend: &BackendHandle,
    layout: &BookLayout,
    source: &str,
    background: &str,
    now: time::OffsetDateTime,
    history_limit: usize,
) -> Result<Option<Manifest>> {
    let files = backend.list(Some(layout.folder())).await.or_raise(|| ErrorKind::Recovery)?;
    let documents: Vec<(u32, &FileInfo)> = files
        .iter()
        .filter(|f| f.path.parent() == Some(layout.folder()))
        .filter_map(|f| Some((layout.page_number(f.file_name()?)?, f)))
        .collect();
    if documents.is_empty() {
        tracing::debug!("No page documents to recover from");
        return Ok(None);
    }

    let mut manifest = Manifest::new(layout.name(), source);
    for (number, info) in documents {
        let parsed = match backend.read(&info.path).await {
            Ok(bytes) => document::parse(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                tracing::warn!(page = number, error = ?err, "Skipping unreadable page document");
                continue;
            },
        };
        // The image artifact's metadata when there is one, the document's
        // otherwise.
        let artifact = backend.stat(&layout.artifact_path(number, ARTIFACT_EXTENSION)).await.ok();
        let basis = artifact.as_ref().unwrap_or(info);
        manifest.pages.insert(
            number,
            PageRecord {
                file: layout.document_name(number),
                imported: basis.modified,
                image_hash: Fingerprint::recovered(basis.size, basis.modified_millis()),
                display_hash: None,
                transcribed: parsed.transcription.is_some(),
                has_audio: parsed.has_audio,
                modified: info.modified,
                size: basis.size,
                background: background.to_string(),
            },
        );
    }
    if manifest.pages.is_empty() {
        return Ok(None);
    }

    manifest.total_pages = manifest.pages.keys().next_back().copied().unwrap_or_default();
    let pages: Vec<u32> = manifest.pages.keys().copied().collect();
    let summary = format!("recovered {} pages from existing documents", pages.len());
    manifest.record_history(HistoryEntry { timestamp: now, action: Action::Recover, pages, summary }, history_limit);
    tracing::info!(pages = manifest.pages.len(), total = manifest.total_pages, "Recovered manifest");
    Ok(Some(manifest))
}

//! The per-book summary document.

use crate::document::timestamp;
use crate::error::{ErrorKind, Result};
use crate::layout::BookLayout;
use crate::templates::Renderer;
use exn::ResultExt;
use quill_manifest::Manifest;
use quill_storage::BackendHandle;
use std::path::PathBuf;
use tracing::instrument;
use upon::Value;

/// Renders the index document of a book from its manifest.
pub fn render_index(renderer: &Renderer, manifest: &Manifest) -> Result<String> {
    let pages = manifest
        .pages
        .iter()
        .map(|(number, record)| {
            upon::value! {
                number: u64::from(*number),
                link: record.file.strip_suffix(".md").unwrap_or(&record.file),
                audio: record.has_audio,
                pending: !record.transcribed,
            }
        })
        .collect();
    let history = manifest
        .history_newest_first()
        .map(|entry| {
            upon::value! {
                timestamp: timestamp(entry.timestamp),
                action: entry.action.to_string(),
                summary: entry.summary.as_str(),
            }
        })
        .collect();
    renderer.render_index(upon::value! {
        book: manifest.book.as_str(),
        source: manifest.source.as_str(),
        total_pages: u64::from(manifest.total_pages),
        imported_pages: manifest.pages.len() as u64,
        last_import: manifest.last_import.map(timestamp).unwrap_or_else(|| "never".to_string()),
        pages: Value::List(pages),
        history: Value::List(history),
    })
}

/// Renders the index and overwrites `{book}/{slug}-index.md` with it.
#[instrument(skip_all, fields(book = %manifest.book))]
pub async fn write_index(
    backend: &BackendHandle,
    renderer: &Renderer,
    manifest: &Manifest,
    layout: &BookLayout,
) -> Result<PathBuf> {
    let text = render_index(renderer, manifest)?;
    let path = layout.index_path();
    backend.write(&path, text.as_bytes()).await.or_raise(|| ErrorKind::Storage)?;
    tracing::debug!(path = %path.display(), "Wrote index");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::tests::record;
    use quill_archive::Fingerprint;
    use quill_manifest::{Action, HistoryEntry};
    use quill_storage::backend::MockBackend;
    use std::sync::Arc;
    use time::macros::datetime;

    fn manifest() -> Manifest {
        let mut manifest = Manifest::new("Notebook", "notebook.note");
        manifest.total_pages = 3;
        let mut first = record(1, Fingerprint::of(b"one"));
        first.has_audio = true;
        first.transcribed = true;
        manifest.pages.insert(1, first);
        manifest.pages.insert(3, record(3, Fingerprint::of(b"three")));
        manifest.last_import = Some(datetime!(2024-05-02 09:00 UTC));
        for (day, summary) in [(1, "first"), (2, "second")] {
            let entry = HistoryEntry {
                timestamp: datetime!(2024-05-01 09:00 UTC) + time::Duration::days(day - 1),
                action: Action::Import,
                pages: vec![1],
                summary: summary.to_string(),
            };
            manifest.record_history(entry, 50);
        }
        manifest
    }

    #[test]
    fn test_render_index() {
        let text = render_index(&Renderer::new().unwrap(), &manifest()).unwrap();
        assert!(text.starts_with("---\nbook: \"Notebook\"\n"));
        assert!(text.contains("- Pages: 2 of 3 imported\n"));
        assert!(text.contains("- Last import: 2024-05-02T09:00:00Z\n"));
        assert!(text.contains("- [[notebook-page-001|Page 1]] (audio)\n"));
        assert!(text.contains("- [[notebook-page-003|Page 3]] (transcription pending)\n"));
        assert!(!text.contains("Page 2]]"));
        // Newest first.
        let second = text.find("import, second").unwrap();
        let first = text.find("import, first").unwrap();
        assert!(second < first);
    }

    #[test]
    fn test_render_never_imported() {
        let text = render_index(&Renderer::new().unwrap(), &Manifest::new("Empty", "empty.note")).unwrap();
        assert!(text.contains("- Last import: never\n"));
        assert!(text.contains("- Pages: 0 of 0 imported\n"));
    }

    #[tokio::test]
    async fn test_write_index_overwrites() {
        let backend = Arc::new(MockBackend::with_files([("Notebook/notebook-index.md", "stale")]));
        let handle: BackendHandle = backend.clone();
        let path = write_index(&handle, &Renderer::new().unwrap(), &manifest(), &BookLayout::new("Notebook")).await.unwrap();
        assert_eq!(path, PathBuf::from("Notebook/notebook-index.md"));
        let text = String::from_utf8(handle.read(&path).await.unwrap()).unwrap();
        assert!(text.contains("# Notebook"));
    }
}

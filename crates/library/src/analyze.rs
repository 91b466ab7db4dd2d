//! Classification of every page of a decoded book against what was imported
//! before.

use crate::document;
use crate::layout::BookLayout;
use derive_more::Display;
use quill_archive::{Book, Fingerprint};
use quill_manifest::Manifest;
use quill_storage::BackendHandle;
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    #[display("new")]
    New,
    #[display("modified")]
    Modified,
    #[display("unchanged")]
    Unchanged,
    #[display("deleted")]
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChange {
    pub page: u32,
    pub kind: ChangeKind,
    /// Baseline the page was compared against.
    pub old: Option<Fingerprint>,
    /// Fingerprint in the archive; `None` for deleted pages.
    pub new: Option<Fingerprint>,
    /// The page gained or lost its audio clip.
    pub audio_changed: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeCounts {
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

/// Per-page changes, sorted by page number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeAnalysis {
    changes: Vec<PageChange>,
}

impl ChangeAnalysis {
    fn from_changes(mut changes: Vec<PageChange>) -> Self {
        changes.sort_by_key(|c| c.page);
        Self { changes }
    }

    pub fn changes(&self) -> &[PageChange] {
        &self.changes
    }

    pub fn get(&self, page: u32) -> Option<&PageChange> {
        self.changes.binary_search_by_key(&page, |c| c.page).ok().map(|i| &self.changes[i])
    }

    pub fn kind(&self, page: u32) -> Option<ChangeKind> {
        self.get(page).map(|c| c.kind)
    }

    pub fn pages(&self, kind: ChangeKind) -> Vec<u32> {
        self.changes.iter().filter(|c| c.kind == kind).map(|c| c.page).collect()
    }

    pub fn new_pages(&self) -> Vec<u32> {
        self.pages(ChangeKind::New)
    }

    pub fn modified_pages(&self) -> Vec<u32> {
        self.pages(ChangeKind::Modified)
    }

    pub fn unchanged_pages(&self) -> Vec<u32> {
        self.pages(ChangeKind::Unchanged)
    }

    pub fn deleted_pages(&self) -> Vec<u32> {
        self.pages(ChangeKind::Deleted)
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for change in &self.changes {
            match change.kind {
                ChangeKind::New => counts.new += 1,
                ChangeKind::Modified => counts.modified += 1,
                ChangeKind::Unchanged => counts.unchanged += 1,
                ChangeKind::Deleted => counts.deleted += 1,
            }
        }
        counts
    }

    /// Nothing new, modified or deleted.
    pub fn is_clean(&self) -> bool {
        self.changes.iter().all(|c| c.kind == ChangeKind::Unchanged)
    }
}

/// Reads the `image_hash` embedded in every page document the manifest knows
/// about. Documents that are missing or unreadable are skipped.
#[instrument(skip_all, fields(book = %manifest.book, pages = manifest.pages.len()))]
pub async fn collect_embedded(
    backend: &BackendHandle,
    layout: &BookLayout,
    manifest: &Manifest,
) -> BTreeMap<u32, Fingerprint> {
    let mut embedded = BTreeMap::new();
    for (number, record) in &manifest.pages {
        let path = layout.folder().join(&record.file);
        match backend.read(&path).await {
            Ok(bytes) => {
                if let Some(hash) = document::parse(&String::from_utf8_lossy(&bytes)).image_hash {
                    embedded.insert(*number, hash);
                }
            },
            Err(err) => tracing::debug!(page = number, error = ?err, "Page document not readable"),
        }
    }
    embedded
}

/// Classifies every page of `book`.
///
/// The baseline of a page is the fingerprint embedded in its document when
/// there is one, otherwise the manifest record's. A page reset by the user
/// is modified whatever its document says. Identical inputs always give
/// identical output.
#[instrument(skip_all, fields(book = %book.name, pages = book.len()))]
pub fn analyze(book: &Book, manifest: Option<&Manifest>, embedded: &BTreeMap<u32, Fingerprint>) -> ChangeAnalysis {
    let Some(manifest) = manifest else {
        let changes = book
            .pages
            .iter()
            .map(|page| PageChange {
                page: page.number,
                kind: ChangeKind::New,
                old: None,
                new: Some(page.image.fingerprint.clone()),
                audio_changed: false,
            })
            .collect();
        return ChangeAnalysis::from_changes(changes);
    };

    let mut changes = Vec::with_capacity(book.len());
    for page in &book.pages {
        let current = &page.image.fingerprint;
        let record = manifest.page(page.number);
        let baseline = match record {
            Some(record) if matches!(record.image_hash, Fingerprint::Reset { .. }) => Some(&record.image_hash),
            _ => embedded.get(&page.number).or(record.map(|r| &r.image_hash)),
        };
        let kind = match baseline {
            None => ChangeKind::New,
            Some(old) if old.matches(current) => ChangeKind::Unchanged,
            Some(_) => ChangeKind::Modified,
        };
        changes.push(PageChange {
            page: page.number,
            kind,
            old: baseline.cloned(),
            new: Some(current.clone()),
            audio_changed: record.is_some_and(|r| r.has_audio != page.audio.is_some()),
        });
    }
    for (number, record) in &manifest.pages {
        if book.page(*number).is_none() {
            changes.push(PageChange {
                page: *number,
                kind: ChangeKind::Deleted,
                old: Some(record.image_hash.clone()),
                new: None,
                audio_changed: false,
            });
        }
    }

    let analysis = ChangeAnalysis::from_changes(changes);
    let counts = analysis.counts();
    tracing::debug!(
        new = counts.new,
        modified = counts.modified,
        unchanged = counts.unchanged,
        deleted = counts.deleted,
        "Analyzed changes"
    );
    analysis
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use quill_archive::{AudioClip, Generation, Page, PageImage};
    use quill_manifest::PageRecord;
    use quill_storage::backend::MockBackend;
    use serde_json::Value;
    use std::sync::Arc;
    use time::OffsetDateTime;

    pub(crate) fn book(pages: &[(u32, &[u8])]) -> Book {
        Book {
            name: "Notebook".to_string(),
            source: "notebook.note".to_string(),
            generation: Generation::V1,
            metadata: Value::Null,
            pages: pages
                .iter()
                .map(|(number, bytes)| Page {
                    number: *number,
                    image: PageImage::new(format!("{number}.png"), bytes.to_vec()),
                    strokes: None,
                    audio: None,
                })
                .collect(),
            thumbnail: None,
        }
    }

    pub(crate) fn record(page: u32, hash: Fingerprint) -> PageRecord {
        PageRecord {
            file: BookLayout::new("Notebook").document_name(page),
            imported: OffsetDateTime::UNIX_EPOCH,
            image_hash: hash,
            display_hash: None,
            transcribed: false,
            has_audio: false,
            modified: OffsetDateTime::UNIX_EPOCH,
            size: 0,
            background: "transparent".to_string(),
        }
    }

    fn manifest(records: &[(u32, Fingerprint)]) -> Manifest {
        let mut manifest = Manifest::new("Notebook", "notebook.note");
        for (page, hash) in records {
            manifest.pages.insert(*page, record(*page, hash.clone()));
        }
        manifest
    }

    #[test]
    fn test_no_manifest_means_all_new() {
        let book = book(&[(1, b"a"), (2, b"b")]);
        let analysis = analyze(&book, None, &BTreeMap::new());
        assert_eq!(analysis.new_pages(), vec![1, 2]);
        assert_eq!(analysis.counts(), ChangeCounts { new: 2, ..Default::default() });
    }

    #[test]
    fn test_scenario() {
        // Page 2 was edited on the device, page 3 was removed.
        let manifest = manifest(&[(1, Fingerprint::of(b"one")), (2, Fingerprint::of(b"two")), (3, Fingerprint::of(b"three"))]);
        let book = book(&[(1, b"one"), (2, b"two, edited")]);
        let analysis = analyze(&book, Some(&manifest), &BTreeMap::new());
        assert!(analysis.new_pages().is_empty());
        assert_eq!(analysis.modified_pages(), vec![2]);
        assert_eq!(analysis.unchanged_pages(), vec![1]);
        assert_eq!(analysis.deleted_pages(), vec![3]);
        assert_eq!(analysis.get(3).unwrap().new, None);
        assert!(!analysis.is_clean());
    }

    #[test]
    fn test_untrusted_baselines_never_match() {
        let bytes: &[u8] = b"same";
        let manifest = manifest(&[
            (1, Fingerprint::fallback(4)),
            (2, Fingerprint::recovered(4, 0)),
            (3, Fingerprint::reset(0)),
        ]);
        let book = book(&[(1, bytes), (2, bytes), (3, bytes)]);
        let analysis = analyze(&book, Some(&manifest), &BTreeMap::new());
        assert_eq!(analysis.modified_pages(), vec![1, 2, 3]);
    }

    #[test]
    fn test_embedded_hash_takes_precedence() {
        // A recovered manifest plus documents that still carry real digests.
        let manifest = manifest(&[(1, Fingerprint::recovered(3, 0)), (2, Fingerprint::of(b"stale"))]);
        let embedded = BTreeMap::from([(1, Fingerprint::of(b"one")), (2, Fingerprint::of(b"two"))]);
        let book = book(&[(1, b"one"), (2, b"two")]);
        let analysis = analyze(&book, Some(&manifest), &embedded);
        assert_eq!(analysis.unchanged_pages(), vec![1, 2]);
    }

    #[test]
    fn test_reset_dominates_embedded_hash() {
        let manifest = manifest(&[(1, Fingerprint::reset(1))]);
        let embedded = BTreeMap::from([(1, Fingerprint::of(b"one"))]);
        let analysis = analyze(&book(&[(1, b"one")]), Some(&manifest), &embedded);
        assert_eq!(analysis.kind(1), Some(ChangeKind::Modified));
    }

    #[test]
    fn test_audio_change_is_flagged() {
        let manifest = manifest(&[(1, Fingerprint::of(b"one"))]);
        let mut book = book(&[(1, b"one")]);
        book.pages[0].audio = Some(AudioClip { entry: "audio/1.m4a".to_string(), bytes: b"m4a".to_vec() });
        let analysis = analyze(&book, Some(&manifest), &BTreeMap::new());
        let change = analysis.get(1).unwrap();
        assert_eq!(change.kind, ChangeKind::Unchanged);
        assert!(change.audio_changed);
    }

    #[test]
    fn test_deterministic() {
        let manifest = manifest(&[(2, Fingerprint::of(b"b")), (5, Fingerprint::of(b"gone"))]);
        let book = book(&[(3, b"c"), (1, b"a"), (2, b"b")]);
        let first = analyze(&book, Some(&manifest), &BTreeMap::new());
        let second = analyze(&book, Some(&manifest), &BTreeMap::new());
        assert_eq!(first, second);
        let order: Vec<u32> = first.changes().iter().map(|c| c.page).collect();
        assert_eq!(order, vec![1, 2, 3, 5]);
    }

    #[tokio::test]
    async fn test_collect_embedded() {
        let layout = BookLayout::new("Notebook");
        let manifest = manifest(&[(1, Fingerprint::recovered(1, 1)), (2, Fingerprint::recovered(1, 1))]);
        let hash = Fingerprint::of(b"one");
        let backend: BackendHandle = Arc::new(MockBackend::with_files([(
            layout.document_path(1),
            format!("---\nimage_hash: {hash}\n---\n"),
        )]));
        let embedded = collect_embedded(&backend, &layout, &manifest).await;
        assert_eq!(embedded, BTreeMap::from([(1, hash)]));
    }
}

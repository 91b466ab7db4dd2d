//! End-to-end import runs against an in-memory library.

use quill_config::{Config, ImportConfig, ManifestConfig};
use quill_library::error::ErrorKind;
use quill_library::{BookLayout, ChangeKind, Library, ManifestState, Selection};
use quill_manifest::{Action, Manifest, ManifestStore};
use quill_storage::backend::{MockBackend, Operation, ReadOnlyBackend, StorageBackend};
use quill_storage::BackendHandle;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use zip::write::SimpleFileOptions;

const FILE_NAME: &str = "notebook.note";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// A generation 1 archive titled "Notebook" with one page per image.
fn archive(images: &[&str]) -> Vec<u8> {
    titled_archive("Notebook", images)
}

fn titled_archive(title: &str, images: &[&str]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("note.json", SimpleFileOptions::default()).unwrap();
    writer.write_all(serde_json::json!({ "title": title }).to_string().as_bytes()).unwrap();
    let list = vec!["{}"; images.len()].join(", ");
    writer.start_file("pages.json", SimpleFileOptions::default()).unwrap();
    writer.write_all(format!("[{list}]").as_bytes()).unwrap();
    for (index, content) in images.iter().enumerate() {
        writer.start_file(format!("images/{}.png", index + 1), SimpleFileOptions::default()).unwrap();
        writer.write_all(&[PNG_MAGIC, content.as_bytes()].concat()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn pages(count: usize) -> Vec<String> {
    (1..=count).map(|n| format!("page {n}")).collect()
}

fn config() -> Config {
    Config {
        import: ImportConfig { batch_size: 3, batch_pause_ms: 0, ..Default::default() },
        ..Default::default()
    }
}

fn library(backend: &Arc<MockBackend>, config: Config) -> Library {
    let handle: BackendHandle = backend.clone();
    Library::new(handle, config).unwrap()
}

async fn manifest(backend: &Arc<MockBackend>) -> Manifest {
    let handle: BackendHandle = backend.clone();
    let path = BookLayout::new("Notebook").manifest_path();
    ManifestStore::new(handle).load(&path).await.unwrap().expect("manifest")
}

#[tokio::test]
async fn test_bootstrap_new_book() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let summary = library.run(&archive(&["one", "two", "three"]), FILE_NAME, &Selection::All).await.unwrap();

    assert_eq!(summary.book, "Notebook");
    assert_eq!(summary.state, ManifestState::Absent);
    assert_eq!((summary.new, summary.total_requested, summary.imported), (3, 3, 3));
    assert!(summary.errors.is_empty());
    assert_eq!(summary.backup, None);
    assert_eq!(summary.artifacts_written, 3);

    let manifest = manifest(&backend).await;
    assert_eq!(manifest.total_pages, 3);
    assert_eq!(manifest.source, FILE_NAME);
    assert_eq!(manifest.pages.len(), 3);
    assert!(manifest.last_import.is_some());
    assert_eq!(manifest.history.len(), 1);
    for path in [
        "Notebook/notebook-page-001.md",
        "Notebook/assets/notebook-page-003.png",
        "Notebook/notebook-index.md",
        "Notebook/.quill/manifest.json",
    ] {
        assert!(backend.exists(Path::new(path)).await.unwrap(), "{path} missing");
    }
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let archive = archive(&["one", "two", "three"]);
    library.run(&archive, FILE_NAME, &Selection::All).await.unwrap();
    let first = manifest(&backend).await;
    backend.clear_journal();

    let summary = library.run(&archive, FILE_NAME, &Selection::All).await.unwrap();
    assert_eq!(summary.state, ManifestState::Loaded);
    assert_eq!((summary.new, summary.modified, summary.unchanged, summary.deleted), (0, 0, 3, 0));
    assert_eq!(summary.artifacts_written, 0);
    assert_eq!(backend.count(Operation::WriteBlob), 0);
    assert!(summary.backup.is_some());

    let second = manifest(&backend).await;
    for (number, record) in &second.pages {
        assert_eq!(record.image_hash, first.pages[number].image_hash);
    }
}

#[tokio::test]
async fn test_changes_between_imports() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    library.run(&archive(&["one", "two", "three"]), FILE_NAME, &Selection::All).await.unwrap();

    // Page 2 edited on the device, page 3 removed.
    let edited = archive(&["one", "two, edited"]);
    let preview = library.analyze(&edited, FILE_NAME).await.unwrap();
    assert_eq!(preview.state, ManifestState::Loaded);
    assert!(preview.analysis.new_pages().is_empty());
    assert_eq!(preview.analysis.modified_pages(), vec![2]);
    assert_eq!(preview.analysis.unchanged_pages(), vec![1]);
    assert_eq!(preview.analysis.deleted_pages(), vec![3]);

    backend.clear_journal();
    let summary = library.run(&edited, FILE_NAME, &Selection::NewAndModified).await.unwrap();
    assert_eq!(summary.total_requested, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(backend.count(Operation::WriteBlob), 1);

    // Deleted pages keep their record.
    let manifest = manifest(&backend).await;
    assert!(manifest.pages.contains_key(&3));
    assert_eq!(manifest.total_pages, 2);
}

#[tokio::test]
async fn test_page_failures_are_isolated() {
    let backend = Arc::new(MockBackend::default().with_failure(Operation::WriteBlob, "page-005"));
    let library = library(&backend, config());
    let images = pages(10);
    let images: Vec<&str> = images.iter().map(String::as_str).collect();
    let summary = library.run(&archive(&images), FILE_NAME, &Selection::All).await.unwrap();

    assert_eq!(summary.imported, 9);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].page, 5);

    let manifest = manifest(&backend).await;
    assert_eq!(manifest.pages.len(), 9);
    assert!(!manifest.pages.contains_key(&5));
    assert_eq!(manifest.total_pages, 10);
}

#[tokio::test]
async fn test_reset_forces_reimport() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let archive = archive(&["one", "two", "three"]);
    library.run(&archive, FILE_NAME, &Selection::All).await.unwrap();

    assert_eq!(library.reset("Notebook", Some(&[2, 9])).await.unwrap(), vec![2]);
    let manifest = manifest(&backend).await;
    assert!(!manifest.pages[&2].image_hash.is_trusted());
    assert_eq!(manifest.history_newest_first().next().unwrap().action, Action::Reset);

    let preview = library.analyze(&archive, FILE_NAME).await.unwrap();
    assert_eq!(preview.analysis.modified_pages(), vec![2]);
    assert_eq!(preview.analysis.get(2).unwrap().kind, ChangeKind::Modified);

    let summary = library.run(&archive, FILE_NAME, &Selection::NewAndModified).await.unwrap();
    assert_eq!(summary.imported, 1);
    assert!(manifest_is_trusted(&backend).await);
}

async fn manifest_is_trusted(backend: &Arc<MockBackend>) -> bool {
    manifest(backend).await.pages.values().all(|r| r.image_hash.is_trusted())
}

#[tokio::test]
async fn test_history_is_capped() {
    let backend = Arc::new(MockBackend::default());
    let config = Config { manifest: ManifestConfig { history_limit: 3, ..Default::default() }, ..config() };
    let library = library(&backend, config);
    let archive = archive(&["one"]);
    for _ in 0..5 {
        library.run(&archive, FILE_NAME, &Selection::All).await.unwrap();
    }
    let manifest = manifest(&backend).await;
    assert_eq!(manifest.history.len(), 3);
    let newest: Vec<_> = manifest.history_newest_first().map(|e| e.timestamp).collect();
    assert!(newest.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_overlapping_runs_are_rejected() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let guard = library.registry().try_acquire("Notebook").unwrap();

    let err = library.run(&archive(&["one"]), FILE_NAME, &Selection::All).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RunInProgress("Notebook".to_string()));
    assert!(backend.journal().is_empty());

    drop(guard);
    assert!(library.run(&archive(&["one"]), FILE_NAME, &Selection::All).await.is_ok());
}

#[tokio::test]
async fn test_names_sharing_a_folder_are_one_book() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    assert_eq!(BookLayout::new("Note:book").folder(), BookLayout::new("Note/book").folder());
    let guard = library.registry().try_acquire("Note:book").unwrap();

    let archive = titled_archive("Note/book", &["one"]);
    let err = library.run(&archive, FILE_NAME, &Selection::All).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RunInProgress("Note/book".to_string()));
    let err = library.reset("Note/book", None).await.unwrap_err();
    assert_eq!(*err, ErrorKind::RunInProgress("Note/book".to_string()));
    assert!(backend.journal().is_empty());

    drop(guard);
    assert!(library.run(&archive, FILE_NAME, &Selection::All).await.is_ok());
}

#[tokio::test]
async fn test_lost_manifest_is_recovered() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let archive = archive(&["one", "two", "three"]);
    library.run(&archive, FILE_NAME, &Selection::All).await.unwrap();
    backend.delete(&BookLayout::new("Notebook").manifest_path()).await.unwrap();
    backend.clear_journal();

    let summary = library.run(&archive, FILE_NAME, &Selection::NewAndModified).await.unwrap();
    assert_eq!(summary.state, ManifestState::Recovered);
    // Documents still carry their digests, so nothing needs rewriting.
    assert_eq!(summary.unchanged, 3);
    assert_eq!(summary.total_requested, 0);
    assert_eq!(backend.count(Operation::WriteBlob), 0);

    let manifest = manifest(&backend).await;
    assert_eq!(manifest.pages.len(), 3);
    assert_eq!(manifest.history[0].action, Action::Recover);
}

#[tokio::test]
async fn test_empty_selection_writes_nothing() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let nothing = Selection::Pages(BTreeSet::new());
    let summary = library.run(&archive(&["one", "two"]), FILE_NAME, &nothing).await.unwrap();
    assert_eq!(summary.new, 2);
    assert_eq!(summary.total_requested, 0);
    assert!(backend.journal().is_empty());
}

#[tokio::test]
async fn test_closure_selection() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let odd = |book: &quill_archive::Book, _: &quill_library::ChangeAnalysis| -> Vec<u32> {
        book.page_numbers().into_iter().filter(|n| n % 2 == 1).collect()
    };
    let summary = library.run(&archive(&["one", "two", "three"]), FILE_NAME, &odd).await.unwrap();
    assert_eq!(summary.imported, 2);
    assert_eq!(manifest(&backend).await.pages.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let backend = Arc::new(MockBackend::default());
    let handle: BackendHandle = backend.clone();
    let library = Library::new(Arc::new(ReadOnlyBackend::new(handle)), config()).unwrap();
    let summary = library.run(&archive(&["one", "two"]), FILE_NAME, &Selection::All).await.unwrap();
    assert_eq!(summary.imported, 2);
    assert!(backend.journal().is_empty());
    assert!(backend.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rebuild_index() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let err = library.rebuild_index("Notebook").await.unwrap_err();
    assert_eq!(*err, ErrorKind::UnknownBook("Notebook".to_string()));

    library.run(&archive(&["one"]), FILE_NAME, &Selection::All).await.unwrap();
    backend.delete(Path::new("Notebook/notebook-index.md")).await.unwrap();
    let path = library.rebuild_index("Notebook").await.unwrap();
    assert!(backend.exists(&path).await.unwrap());
}

#[tokio::test]
async fn test_invalid_archive_aborts() {
    let backend = Arc::new(MockBackend::default());
    let library = library(&backend, config());
    let err = library.run(b"not a zip", FILE_NAME, &Selection::All).await.unwrap_err();
    assert_eq!(*err, ErrorKind::Decode);
    assert!(backend.journal().is_empty());
}

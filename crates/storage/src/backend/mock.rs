//! In-memory storage backend for testing.

use super::FileInfoStream;
use crate::error::{ErrorKind, Result};
use crate::models::FileInfo;
use crate::path::validate as validate_path;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::StorageBackend;

/// Storage operations that can be made to fail, or that are recorded in the
/// [journal](MockBackend::journal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    WriteBlob,
    Delete,
    Copy,
    EnsureDir,
    Stat,
}

/// In-memory storage backend for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Failures can be
/// injected per operation for any path containing a given substring, and
/// every mutating operation is recorded in a journal.
///
/// # Examples
///
/// ```
/// use quill_storage::backend::{MockBackend, Operation, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("book/index.md", b"# Book")])
///     .with_failure(Operation::WriteBlob, "page-005");
/// assert!(backend.exists(Path::new("book/index.md")).await?);
/// assert!(backend.write_blob(Path::new("book/assets/book-page-005.png"), b"png").await.is_err());
/// backend.write_blob(Path::new("book/assets/book-page-006.png"), b"png").await?;
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    dirs: RwLock<BTreeSet<PathBuf>>,
    failures: Vec<(Operation, String)>,
    journal: Mutex<Vec<(Operation, PathBuf)>>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            dirs: RwLock::new(BTreeSet::new()),
            failures: Vec::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make `operation` fail for every path containing `needle`.
    pub fn with_failure(mut self, operation: Operation, needle: impl Into<String>) -> Self {
        self.failures.push((operation, needle.into()));
        self
    }

    /// Every mutating operation performed so far, in order.
    pub fn journal(&self) -> Vec<(Operation, PathBuf)> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    /// Number of journal entries for the given operation.
    pub fn count(&self, operation: Operation) -> usize {
        self.journal().iter().filter(|(op, _)| *op == operation).count()
    }

    /// Forget everything recorded in the journal so far.
    pub fn clear_journal(&self) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.clear();
        }
    }

    /// Replace a file's modification time, for tests that depend on it.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: OffsetDateTime) {
        if let Ok(path) = validate_path(path)
            && let Some(entry) = self.storage.write().await.get_mut(&path)
        {
            entry.0 = modified;
        }
    }

    fn check(&self, operation: Operation, path: &Path) -> Result<()> {
        let text = path.to_string_lossy();
        if self.failures.iter().any(|(op, needle)| *op == operation && text.contains(needle.as_str())) {
            exn::bail!(ErrorKind::Injected(path.to_path_buf()));
        }
        Ok(())
    }

    fn record(&self, operation: Operation, path: &Path) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push((operation, path.to_path_buf()));
        }
    }

    async fn insert(&self, operation: Operation, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.check(operation, &path)?;
        self.storage.write().await.insert(path.clone(), (OffsetDateTime::now_utc(), data.to_vec()));
        self.record(operation, &path);
        Ok(())
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let mut entries: Vec<FileInfo> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| FileInfo::new(path.clone(), data.len() as u64, *modified))
                    .collect()
            };
            entries.sort_by(|a, b| a.path.cmp(&b.path));
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.storage.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        self.check(Operation::Read, &path)?;
        let (_modified, data) =
            self.storage.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))?;
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.insert(Operation::Write, path, data).await
    }

    async fn write_blob(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.insert(Operation::WriteBlob, path, data).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.check(Operation::Delete, &path)?;
        self.storage.write().await.remove(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        self.record(Operation::Delete, &path);
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        self.check(Operation::Copy, &to)?;
        let mut guard = self.storage.write().await;
        let (_modified, data) = guard.get(&from).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(from)))?;
        guard.insert(to.clone(), (OffsetDateTime::now_utc(), data));
        drop(guard);
        self.record(Operation::Copy, &to);
        Ok(())
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.check(Operation::EnsureDir, &path)?;
        self.dirs.write().await.insert(path.clone());
        self.record(Operation::EnsureDir, &path);
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let path = validate_path(path)?;
        self.check(Operation::Stat, &path)?;
        let guard = self.storage.read().await;
        let (modified, data) = guard.get(&path).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path.clone())))?;
        Ok(FileInfo::new(path.clone(), data.len() as u64, *modified))
    }
}

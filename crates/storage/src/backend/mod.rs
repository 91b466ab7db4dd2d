//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait: the narrow set of file
//! operations the importer needs from whatever hosts the document tree (local
//! filesystem, a note-taking application's vault API, or an in-memory mock).

mod local;
#[cfg(feature = "mock")]
mod mock;
mod ro;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
pub use self::ro::ReadOnlyBackend;
use crate::error::Result;
use crate::models::FileInfo;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

type FileInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<FileInfo>> + Send + 'a>>;

/// Unified interface for storage backends.
///
/// All operations are asynchronous; a host application's storage API is
/// rarely synchronous and the import executor writes many pages
/// concurrently.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Writes
/// There are two write primitives. [`write`](Self::write) is the document
/// write a host exposes for its own files; hosts may reject it for paths in
/// folders they have not indexed yet (for example immediately after
/// [`ensure_dir`](Self::ensure_dir)). [`write_blob`](Self::write_blob) is the
/// lower-level binary write that creates parent folders as needed. Callers
/// that must not fail (manifests) retry a failed `write` through
/// `write_blob`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quill_storage::{backend::StorageBackend, error::Result};
///
/// async fn document_size(backend: &dyn StorageBackend) -> Result<u64> {
///     let path = Path::new("notebook/notebook-page-001.md");
///     if backend.exists(path).await? {
///         Ok(backend.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend, used for logging only.
    fn name(&self) -> &str;

    /// List all files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<FileInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream file metadata matching an optional prefix.
    ///
    /// If a prefix is provided, only files whose paths start with the prefix
    /// (component-wise) are returned. Listing a folder that does not exist
    /// yields an empty stream, not an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use quill_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("notebook")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write (create or overwrite) a document.
    ///
    /// Implementations are allowed to reject writes whose parent folder does
    /// not exist yet.
    ///
    /// ```no_run
    /// use std::path::Path;
    /// # use quill_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// backend.ensure_dir(Path::new("notebook")).await?;
    /// backend.write(Path::new("notebook/index.md"), b"# Notebook\n").await?;
    /// # Ok(())
    /// # }
    /// ```
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Write (create or overwrite) a binary blob, creating parent folders as
    /// needed.
    ///
    /// Default implementation delegates to [`write`](Self::write).
    async fn write_blob(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.write(path, data).await
    }

    /// Delete a file.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Copy a file, overwriting the destination.
    ///
    /// Default implementation reads the source and writes it through
    /// [`write_blob`](Self::write_blob).
    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.read(from).await?;
        self.write_blob(to, &data).await
    }

    /// Ensure a folder (and its parents) exists.
    ///
    /// Must be idempotent and must not fail if another actor created the
    /// folder concurrently.
    async fn ensure_dir(&self, path: &Path) -> Result<()>;

    /// Get file metadata without reading contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn stat(&self, path: &Path) -> Result<FileInfo>;
}

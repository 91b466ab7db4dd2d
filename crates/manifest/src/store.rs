use exn::ResultExt;
use quill_storage::BackendHandle;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::models::{Manifest, SCHEMA_VERSION};

/// Loads and persists [`Manifest`]s through a storage backend.
#[derive(Clone)]
pub struct ManifestStore {
    backend: BackendHandle,
    backup: bool,
}

impl ManifestStore {
    pub fn new(backend: BackendHandle) -> Self {
        Self { backend, backup: true }
    }

    /// Enable or disable timestamped backups (enabled by default).
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Returns `None` if there is no manifest yet. A manifest that exists
    /// but doesn't parse is an error.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn load(&self, path: &Path) -> Result<Option<Manifest>> {
        if !self.backend.exists(path).await.or_raise(|| ErrorKind::Storage)? {
            tracing::debug!("No manifest found");
            return Ok(None);
        }
        let bytes = self.backend.read(path).await.or_raise(|| ErrorKind::Storage)?;
        let mut manifest: Manifest =
            serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Malformed(path.to_path_buf()))?;
        if manifest.version != SCHEMA_VERSION {
            tracing::debug!(version = %manifest.version, "Reading manifest as current schema");
            manifest.version = SCHEMA_VERSION.to_string();
        }
        Ok(Some(manifest))
    }

    /// Writes a full snapshot of the manifest.
    ///
    /// A failed document write is retried once as a blob write, after making
    /// sure the parent folder exists. Only a failure of the retry is an error.
    #[instrument(skip(self, manifest), fields(path = %path.display(), pages = manifest.pages.len()))]
    pub async fn save(&self, path: &Path, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest).or_raise(|| ErrorKind::Serialize)?;
        let Err(err) = self.backend.write(path, &json).await else {
            return Ok(());
        };
        tracing::warn!(error = ?err, "Manifest write failed, retrying as blob");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
            && let Err(err) = self.backend.ensure_dir(parent).await
        {
            tracing::warn!(error = ?err, "Could not create manifest folder");
        }
        self.backend.write_blob(path, &json).await.or_raise(|| ErrorKind::Storage)
    }

    /// Copies the current manifest to `manifest.{timestamp}.json.bak` beside
    /// it. Returns the backup path, or `None` when backups are disabled or
    /// there's nothing to back up.
    #[instrument(skip(self, now), fields(path = %path.display()))]
    pub async fn backup(&self, path: &Path, now: OffsetDateTime) -> Result<Option<PathBuf>> {
        if !self.backup || !self.backend.exists(path).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(None);
        }
        let destination = backup_path(path, now)?;
        self.backend.copy(path, &destination).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(backup = %destination.display(), "Backed up manifest");
        Ok(Some(destination))
    }
}

fn backup_path(path: &Path, now: OffsetDateTime) -> Result<PathBuf> {
    let stamp = now
        .to_offset(UtcOffset::UTC)
        .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
        .or_raise(|| ErrorKind::Serialize)?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("manifest");
    Ok(path.with_file_name(format!("{stem}.{stamp}.json.bak")))
}

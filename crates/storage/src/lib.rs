//! Host storage for imported books.
//!
//! Everything the importer writes (page documents, image/audio/vector
//! artifacts, manifests, indexes) goes through a [`StorageBackend`]. Paths are
//! always relative to the backend root and validated with [`validate_path`].

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::FileInfo;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

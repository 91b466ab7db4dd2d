//! The per-book import manifest: the only state that survives between runs.
//!
//! A manifest records, for every imported page, the fingerprint of the
//! bitmap it was built from. The next import diffs against it to decide what
//! changed.

pub mod error;
mod models;
mod store;

pub use crate::models::{Action, HistoryEntry, Manifest, PageRecord, SCHEMA_VERSION};
pub use crate::store::ManifestStore;

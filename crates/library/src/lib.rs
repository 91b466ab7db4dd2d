//! Import reconciliation between handwritten-note archives and a document
//! library.
//!
//! A [`Library`] run decodes an archive, loads (or recovers) the book's
//! manifest, classifies every page as new, modified, unchanged or deleted,
//! materializes the pages a [`SelectionResolver`] picks, and persists the
//! updated manifest and index.

mod analyze;
mod compose;
mod document;
pub mod error;
pub mod import;
mod index;
mod layout;
mod recover;
mod reduce;
mod run;
mod select;
mod templates;
mod transcribe;

pub use crate::analyze::{ChangeAnalysis, ChangeCounts, ChangeKind, PageChange, analyze, collect_embedded};
pub use crate::compose::{Composed, compose};
pub use crate::document::{PageView, ParsedDocument, parse as parse_document};
pub use crate::import::{Context, ImportReport, PageError, PageOutcome, import_pages};
pub use crate::index::{render_index, write_index};
pub use crate::layout::BookLayout;
pub use crate::recover::recover;
pub use crate::reduce::reduce;
pub use crate::run::{Library, ManifestState, Preview, RunGuard, RunRegistry, RunSummary};
pub use crate::select::{Selection, SelectionResolver, normalize as normalize_selection};
pub use crate::templates::Renderer;
pub use crate::transcribe::{Transcriber, Transcription};

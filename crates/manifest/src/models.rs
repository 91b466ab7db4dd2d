use derive_more::Display;
use quill_archive::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Manifest layout version written by this crate. Older manifests are read
/// as if they were this version.
pub const SCHEMA_VERSION: &str = "2";

fn schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn epoch() -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH
}

/// Everything remembered about one book between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub book: String,
    /// Number of pages the book had at the last import (highest page
    /// number).
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub pages: BTreeMap<u32, PageRecord>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_import: Option<OffsetDateTime>,
    /// File name of the archive last imported.
    #[serde(default)]
    pub source: String,
    #[serde(default = "schema_version")]
    pub version: String,
    /// Oldest first. Use [`history_newest_first`](Self::history_newest_first)
    /// for display.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// What was materialized for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// File name of the page document.
    pub file: String,
    #[serde(with = "time::serde::rfc3339", default = "epoch")]
    pub imported: OffsetDateTime,
    /// Fingerprint of the original (unprocessed) bitmap.
    pub image_hash: Fingerprint,
    /// Fingerprint of the written artifact, when it differs from the
    /// original because a background was applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_hash: Option<Fingerprint>,
    #[serde(default)]
    pub transcribed: bool,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(with = "time::serde::rfc3339", default = "epoch")]
    pub modified: OffsetDateTime,
    /// Byte size of the original bitmap.
    #[serde(default)]
    pub size: u64,
    /// Background setting the image artifact was written with.
    #[serde(default)]
    pub background: String,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[display("import")]
    Import,
    #[display("reset")]
    Reset,
    #[display("recover")]
    Recover,
    /// Written by a newer or older version of the importer.
    #[serde(other)]
    #[display("other")]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub action: Action,
    #[serde(default)]
    pub pages: Vec<u32>,
    #[serde(default)]
    pub summary: String,
}

impl Manifest {
    pub fn new(book: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            book: book.into(),
            total_pages: 0,
            pages: BTreeMap::new(),
            last_import: None,
            source: source.into(),
            version: schema_version(),
            history: Vec::new(),
        }
    }

    pub fn page(&self, number: u32) -> Option<&PageRecord> {
        self.pages.get(&number)
    }

    /// Appends to the history, evicting the oldest entries beyond `limit`.
    ///
    /// ```
    /// # use quill_manifest::{Action, HistoryEntry, Manifest};
    /// # use time::OffsetDateTime;
    /// let mut manifest = Manifest::new("Notebook", "notebook.note");
    /// for page in 1..=4 {
    ///     let entry = HistoryEntry {
    ///         timestamp: OffsetDateTime::UNIX_EPOCH,
    ///         action: Action::Import,
    ///         pages: vec![page],
    ///         summary: String::new(),
    ///     };
    ///     manifest.record_history(entry, 3);
    /// }
    /// let newest: Vec<u32> = manifest.history_newest_first().map(|e| e.pages[0]).collect();
    /// assert_eq!(newest, vec![4, 3, 2]);
    /// ```
    pub fn record_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.history.push(entry);
        let limit = limit.max(1);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    pub fn history_newest_first(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter().rev()
    }

    /// Invalidates the image hash of the given pages (or of every page when
    /// `pages` is `None`), so the next import treats them as modified.
    /// Returns the pages that were actually reset.
    pub fn reset_pages(&mut self, pages: Option<&[u32]>, now: OffsetDateTime) -> Vec<u32> {
        let at = i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX);
        let mut reset = Vec::new();
        for (number, record) in &mut self.pages {
            if pages.is_none_or(|wanted| wanted.contains(number)) {
                record.image_hash = Fingerprint::reset(at);
                record.display_hash = None;
                reset.push(*number);
            }
        }
        reset
    }
}

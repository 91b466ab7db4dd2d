//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// An archive decoding error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every one of these is fatal to an import run: the archive either opens
/// and describes its pages, or it doesn't. Problems with individual pages
/// are logged and the page is dropped instead.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container could not be opened as a zip archive.
    #[display("unreadable archive")]
    Archive,
    /// The archive opened, but its structure isn't one we understand.
    #[display("invalid note archive: {_0}")]
    InvalidArchive(#[error(not(source))] String),
    /// A required entry is missing from the archive.
    #[display("missing archive entry: {_0}")]
    MissingEntry(#[error(not(source))] String),
    /// A structural JSON entry could not be parsed.
    #[display("malformed JSON in entry: {_0}")]
    Json(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The archive is either valid or it's not.
        false
    }
}

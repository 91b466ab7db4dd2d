//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors of individual pages during an
//! import never surface here; they are collected into the
//! [`ImportReport`](crate::ImportReport) instead.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The archive could not be decoded.
    #[display("could not decode archive")]
    Decode,
    /// Loading or persisting the manifest failed.
    #[display("manifest could not be loaded or saved")]
    Manifest,
    #[display("storage operation failed")]
    Storage,
    #[display("template could not be compiled or rendered")]
    Template,
    #[display("image could not be processed")]
    Image,
    #[display("transcription failed")]
    Transcription,
    /// Another run for the same book has not finished yet.
    #[display("an import of \"{_0}\" is already running")]
    RunInProgress(#[error(not(source))] String),
    #[display("manifest recovery failed")]
    Recovery,
    /// There is no manifest for the book, so there's nothing to act on.
    #[display("no imported book named \"{_0}\"")]
    UnknownBook(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Transcription | Self::RunInProgress(_))
    }
}

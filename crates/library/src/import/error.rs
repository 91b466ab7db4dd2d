//! Error types for the [`import`](super) module.
//!
//! These never abort a run: a page that fails is reported in the
//! [`ImportReport`](super::ImportReport) and the other pages carry on.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A page import error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for page imports.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong while materializing one page.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An artifact or the page document could not be written.
    #[display("could not write {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// Checking for an existing artifact or document failed.
    #[display("could not read {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The page bitmap could not be composited.
    #[display("page image could not be processed")]
    Image,
    #[display("page document could not be rendered")]
    Template,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Read(_))
    }
}

//! Manifest Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A manifest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The storage backend failed; see the error tree for details.
    #[display("manifest storage failed")]
    Storage,
    /// A manifest exists but could not be parsed. Never silently replaced:
    /// the user has to fix or remove it.
    #[display("malformed manifest: {}", _0.display())]
    Malformed(#[error(not(source))] PathBuf),
    #[display("could not serialize manifest")]
    Serialize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

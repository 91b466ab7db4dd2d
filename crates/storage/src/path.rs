//! Path validation.
//!
//! Every path handed to a backend is relative to the library root. Book
//! names come straight out of archive metadata, so nothing here trusts them.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a storage path so that it never escapes the
/// storage root (no `..` traversal past the root, no absolute prefixes).
///
/// > **Note:** This does **not** normalize backslashes or non-UTF8 bytes.
/// >           Null bytes are explicitly rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quill_storage::validate_path;
/// assert!(validate_path("my-notebook/my-notebook-page-001.md").is_ok());
/// assert!(validate_path("book/../other-book/index.md").is_ok());
/// assert!(validate_path("../outside.md").is_err());
/// assert!(validate_path("book/../../outside.md").is_err());
/// assert_eq!(
///     validate_path("book//./assets/../assets/p.png/").unwrap(),
///     Path::new("book/assets/p.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let mut components = Vec::new();
    for component in original.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

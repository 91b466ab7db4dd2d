//! Where everything belonging to a book lives in the library.
//!
//! ```text
//! {book}/
//! ├── .quill/manifest.json
//! ├── .quill/manifest.20240501T083005Z.json.bak
//! ├── {slug}-index.md
//! ├── {slug}-page-001.md
//! └── assets/
//!     ├── {slug}-page-001.png
//!     ├── {slug}-page-001.m4a
//!     └── {slug}-page-001.svg
//! ```

use rslug::slugify;
use std::path::{Path, PathBuf};

const MANIFEST_DIR: &str = ".quill";
const MANIFEST_FILE: &str = "manifest.json";
const ASSETS_DIR: &str = "assets";
const PAGE_INFIX: &str = "-page-";
const DOCUMENT_EXTENSION: &str = ".md";
/// Page numbers are zero-padded to at least this many digits.
const PAGE_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLayout {
    name: String,
    folder: PathBuf,
    slug: String,
}

impl BookLayout {
    pub fn new(book: &str) -> Self {
        let name = book.trim().to_string();
        let mut slug = slugify!(&name);
        if slug.is_empty() {
            slug = "book".to_string();
        }
        let folder: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() { '-' } else { c })
            .collect();
        let folder = folder.trim().trim_start_matches('.').trim();
        let folder = PathBuf::from(if folder.is_empty() { slug.as_str() } else { folder });
        Self { name, folder, slug }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Book folder, relative to the library root.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.folder.join(MANIFEST_DIR).join(MANIFEST_FILE)
    }

    pub fn index_name(&self) -> String {
        format!("{}-index{DOCUMENT_EXTENSION}", self.slug)
    }

    pub fn index_path(&self) -> PathBuf {
        self.folder.join(self.index_name())
    }

    /// `{slug}-page-{NNN}`, the shared stem of a page's document and
    /// artifacts.
    pub fn page_stem(&self, page: u32) -> String {
        format!("{}{PAGE_INFIX}{page:0width$}", self.slug, width = PAGE_DIGITS)
    }

    pub fn document_name(&self, page: u32) -> String {
        format!("{}{DOCUMENT_EXTENSION}", self.page_stem(page))
    }

    pub fn document_path(&self, page: u32) -> PathBuf {
        self.folder.join(self.document_name(page))
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.folder.join(ASSETS_DIR)
    }

    pub fn artifact_name(&self, page: u32, extension: &str) -> String {
        format!("{}.{extension}", self.page_stem(page))
    }

    pub fn artifact_path(&self, page: u32, extension: &str) -> PathBuf {
        self.assets_dir().join(self.artifact_name(page, extension))
    }

    /// Link target of an artifact as embedded in a page document.
    pub fn artifact_link(&self, page: u32, extension: &str) -> String {
        format!("{ASSETS_DIR}/{}", self.artifact_name(page, extension))
    }

    /// Page number of a page document file name, if (and only if) it matches
    /// `{slug}-page-{NNN}.md` exactly.
    ///
    /// ```
    /// # use quill_library::BookLayout;
    /// let layout = BookLayout::new("Lab Notes");
    /// assert_eq!(layout.page_number("lab-notes-page-007.md"), Some(7));
    /// assert_eq!(layout.page_number("lab-notes-page-1234.md"), Some(1234));
    /// assert_eq!(layout.page_number("lab-notes-page-7.md"), None);
    /// assert_eq!(layout.page_number("lab-notes-index.md"), None);
    /// assert_eq!(layout.page_number("other-page-007.md"), None);
    /// ```
    pub fn page_number(&self, file_name: &str) -> Option<u32> {
        let digits = file_name
            .strip_prefix(self.slug.as_str())?
            .strip_prefix(PAGE_INFIX)?
            .strip_suffix(DOCUMENT_EXTENSION)?;
        if digits.len() < PAGE_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().filter(|page| *page > 0)
    }
}

use super::Page;
use derive_more::Display;
use serde_json::Value;

/// The two archive layouts produced by different device firmware.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Generation {
    /// Flat page list plus numerically named images.
    #[display("v1")]
    V1,
    /// Page-resource manifest with typed resource records.
    #[display("v2")]
    V2,
}

/// One decoded archive: its pages plus whatever metadata came with it.
///
/// Immutable once decoded; owned by the import run that decoded it.
#[derive(Debug, Clone)]
pub struct Book {
    pub name: String,
    /// File name of the archive the book was decoded from.
    pub source: String,
    pub generation: Generation,
    /// Raw metadata entry, or [`Value::Null`] if the archive has none.
    pub metadata: Value,
    /// Pages in archive order. Numbers are stable positions and may have
    /// gaps where a page's bitmap was missing.
    pub pages: Vec<Page>,
    pub thumbnail: Option<Vec<u8>>,
}
impl Book {
    pub fn page(&self, number: u32) -> Option<&Page> {
        self.pages.iter().find(|p| p.number == number)
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.number).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

//! Which pages a run should materialize.
//!
//! Selection is up to the caller (a dialog, a command line flag, a script),
//! so it is a trait. [`Selection`] covers the usual choices.

use crate::analyze::{ChangeAnalysis, ChangeKind};
use quill_archive::Book;
use std::collections::BTreeSet;

pub trait SelectionResolver: Send + Sync {
    /// Page numbers to import. May be unsorted or contain pages the book
    /// doesn't have; the run normalizes the result. Empty means nothing to do.
    fn select(&self, book: &Book, analysis: &ChangeAnalysis) -> Vec<u32>;
}

impl<F> SelectionResolver for F
where
    F: Fn(&Book, &ChangeAnalysis) -> Vec<u32> + Send + Sync,
{
    fn select(&self, book: &Book, analysis: &ChangeAnalysis) -> Vec<u32> {
        self(book, analysis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    New,
    Modified,
    /// Everything that is not unchanged.
    NewAndModified,
    All,
    /// Inclusive range of page numbers.
    Range(u32, u32),
    Pages(BTreeSet<u32>),
}

impl SelectionResolver for Selection {
    fn select(&self, book: &Book, analysis: &ChangeAnalysis) -> Vec<u32> {
        let kind_is = |page: u32, kinds: &[ChangeKind]| analysis.kind(page).is_some_and(|k| kinds.contains(&k));
        let pages = book.pages.iter().map(|p| p.number);
        let selected: Vec<u32> = match self {
            Self::New => pages.filter(|n| kind_is(*n, &[ChangeKind::New])).collect(),
            Self::Modified => pages.filter(|n| kind_is(*n, &[ChangeKind::Modified])).collect(),
            Self::NewAndModified => pages.filter(|n| kind_is(*n, &[ChangeKind::New, ChangeKind::Modified])).collect(),
            Self::All => pages.collect(),
            Self::Range(start, end) => pages.filter(|n| (*start..=*end).contains(n)).collect(),
            Self::Pages(wanted) => pages.filter(|n| wanted.contains(n)).collect(),
        };
        normalize(book, selected)
    }
}

/// Sorts, deduplicates, and drops pages the book doesn't have.
pub fn normalize(book: &Book, selected: impl IntoIterator<Item = u32>) -> Vec<u32> {
    selected.into_iter().filter(|n| book.page(*n).is_some()).collect::<BTreeSet<_>>().into_iter().collect()
}

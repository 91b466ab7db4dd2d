//! Matching of audio recordings to page numbers.
//!
//! Archives don't record which page an audio file belongs to, so the
//! association is inferred from entry names. Strategies are tried in order
//! for each page and the first one that finds a candidate wins.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::consts::{AUDIO_EXTENSIONS, AUDIO_FOLDER_INDEX_REGEX, AUDIO_INDEX_REGEX};
use crate::models::extension;

const PAGE_PLACEHOLDER: &str = "{n}";

/// One way of associating an audio entry with a page number.
#[derive(Debug, Clone)]
pub enum AudioMatcher {
    /// Case-insensitive substring; `{n}` is replaced with the page number.
    Literal(String),
    /// The first capture group must parse to the page number. Matched
    /// against the entry name with its extension removed.
    IndexedRegex(Regex),
    /// The n-th candidate in lexicographic order, unless a named matcher
    /// already claimed it for a different page.
    Positional,
}

impl AudioMatcher {
    fn is_named(&self) -> bool {
        !matches!(self, Self::Positional)
    }

    fn matches(&self, entry: &str, page: u32) -> bool {
        match self {
            Self::Literal(pattern) => {
                let needle = pattern.replace(PAGE_PLACEHOLDER, &page.to_string()).to_lowercase();
                entry.to_lowercase().contains(&needle)
            },
            Self::IndexedRegex(regex) => regex
                .captures(strip_extension(entry))
                .and_then(|captures| captures.get(1))
                .and_then(|index| index.as_str().parse::<u32>().ok())
                .is_some_and(|index| index == page),
            Self::Positional => false,
        }
    }
}

fn strip_extension(entry: &str) -> &str {
    match entry.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => entry,
    }
}

/// Returns `true` if the entry name carries a known audio extension.
pub fn is_audio(entry: &str) -> bool {
    extension(entry).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Ordered list of [`AudioMatcher`] strategies.
#[derive(Debug, Clone)]
pub struct AudioResolver {
    matchers: Vec<AudioMatcher>,
}

impl Default for AudioResolver {
    fn default() -> Self {
        Self {
            matchers: vec![
                AudioMatcher::Literal("audio/{n}.".to_string()),
                AudioMatcher::Literal("audio_{n}.".to_string()),
                AudioMatcher::Literal("audio-{n}.".to_string()),
                AudioMatcher::Literal("page{n}_audio".to_string()),
                AudioMatcher::Literal("page_{n}.".to_string()),
                AudioMatcher::IndexedRegex(AUDIO_FOLDER_INDEX_REGEX.clone()),
                AudioMatcher::IndexedRegex(AUDIO_INDEX_REGEX.clone()),
                AudioMatcher::Positional,
            ],
        }
    }
}

impl AudioResolver {
    /// Resolver with no strategies at all; nothing ever matches.
    pub fn empty() -> Self {
        Self { matchers: Vec::new() }
    }

    /// Adds a strategy after all existing named strategies, but before the
    /// positional fallback.
    pub fn with_matcher(mut self, matcher: AudioMatcher) -> Self {
        let position = self.matchers.iter().position(|m| !m.is_named()).unwrap_or(self.matchers.len());
        self.matchers.insert(position, matcher);
        self
    }

    /// Assigns at most one candidate entry to each page.
    ///
    /// Non-audio candidates are ignored. Named strategies are applied to
    /// every page first, so that the positional fallback can see which
    /// entries are already spoken for.
    ///
    /// ```
    /// use quill_archive::AudioResolver;
    /// let candidates = ["audio/2.m4a", "audio/1.m4a", "memo.mp3"].map(String::from);
    /// let resolved = AudioResolver::default().resolve(&candidates, &[1, 2, 3]);
    /// assert_eq!(resolved[&1], "audio/1.m4a");
    /// assert_eq!(resolved[&2], "audio/2.m4a");
    /// assert_eq!(resolved[&3], "memo.mp3");
    /// ```
    pub fn resolve(&self, candidates: &[String], pages: &[u32]) -> BTreeMap<u32, String> {
        let mut sorted: Vec<&str> = candidates.iter().map(String::as_str).filter(|c| is_audio(c)).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut resolved = BTreeMap::new();
        for &page in pages {
            let found = self
                .matchers
                .iter()
                .filter(|m| m.is_named())
                .find_map(|matcher| sorted.iter().find(|entry| matcher.matches(entry, page)));
            if let Some(entry) = found {
                resolved.insert(page, (*entry).to_string());
            }
        }

        if self.matchers.iter().any(|m| !m.is_named()) {
            let claimed: HashSet<&str> = resolved.values().map(String::as_str).collect();
            let mut positional = Vec::new();
            for &page in pages {
                if resolved.contains_key(&page) || page == 0 {
                    continue;
                }
                if let Some(entry) = sorted.get(page as usize - 1)
                    && !claimed.contains(entry)
                {
                    positional.push((page, (*entry).to_string()));
                }
            }
            resolved.extend(positional);
        }

        for (page, entry) in &resolved {
            tracing::trace!(page, entry = entry.as_str(), "Resolved page audio");
        }
        resolved
    }
}

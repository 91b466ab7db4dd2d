use super::StrokeData;
use crate::Fingerprint;

/// One numbered page of a [`Book`](super::Book).
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in the archive's page list; the join key between
    /// the decoded book, the manifest and the materialized documents.
    pub number: u32,
    pub image: PageImage,
    pub strokes: Option<StrokeData>,
    pub audio: Option<AudioClip>,
}

/// The raw bitmap of a page and its fingerprint.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// Archive entry the bytes came from.
    pub entry: String,
    pub bytes: Vec<u8>,
    /// Fingerprint of the original (pre-processing) bytes.
    pub fingerprint: Fingerprint,
}
impl PageImage {
    pub fn new(entry: impl Into<String>, bytes: Vec<u8>) -> Self {
        let fingerprint = Fingerprint::of(&bytes);
        Self { entry: entry.into(), bytes, fingerprint }
    }

    /// Lowercased extension of the source entry (`png` when unknown).
    pub fn extension(&self) -> String {
        super::extension(&self.entry).unwrap_or_else(|| "png".to_string())
    }
}

/// An audio recording attached to a page.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub entry: String,
    pub bytes: Vec<u8>,
}
impl AudioClip {
    pub fn extension(&self) -> String {
        super::extension(&self.entry).unwrap_or_else(|| "mp3".to_string())
    }
}

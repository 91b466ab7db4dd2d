//! Content fingerprints used for change detection.
//!
//! A fingerprint is normally a truncated BLAKE3 digest of a page's raw
//! bitmap bytes. Three placeholder variants share the same manifest field,
//! and none of them is ever considered equal to anything: a page whose
//! baseline is a placeholder is always re-imported.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::convert::Infallible;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Number of hex characters kept from the digest. Collisions at this length
/// are accepted in exchange for compact manifests.
pub const DIGEST_LEN: usize = 16;

const FALLBACK_PREFIX: &str = "size-";
const RECOVERED_PREFIX: &str = "recovered-";
const RESET_PREFIX: &str = "RESET-";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Truncated hex digest of the complete byte sequence.
    Digest(String),
    /// The bytes could not be read completely; only the declared size is
    /// known.
    Fallback { size: u64 },
    /// Reconstructed from an already-imported file during manifest
    /// recovery. `mtime` is in unix milliseconds.
    Recovered { size: u64, mtime: i64 },
    /// Explicitly invalidated by the user at `at` (unix milliseconds).
    Reset { at: i64 },
}

impl Fingerprint {
    /// Fingerprint of the complete byte sequence.
    ///
    /// ```
    /// use quill_archive::Fingerprint;
    /// let a = Fingerprint::of(b"page one");
    /// assert_eq!(a, Fingerprint::of(b"page one"));
    /// assert!(a.matches(&Fingerprint::of(b"page one")));
    /// assert!(!a.matches(&Fingerprint::of(b"page two")));
    /// assert_eq!(a.to_string().len(), quill_archive::DIGEST_LEN);
    /// ```
    pub fn of(bytes: impl AsRef<[u8]>) -> Self {
        let mut hex = blake3::hash(bytes.as_ref()).to_string();
        hex.truncate(DIGEST_LEN);
        Self::Digest(hex)
    }

    pub fn fallback(size: u64) -> Self {
        Self::Fallback { size }
    }

    pub fn recovered(size: u64, mtime: i64) -> Self {
        Self::Recovered { size, mtime }
    }

    pub fn reset(at: i64) -> Self {
        Self::Reset { at }
    }

    /// Only real digests can be trusted for equality.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Digest(_))
    }

    /// Returns `true` only if both fingerprints are trusted digests of
    /// identical content. Placeholders never match, not even themselves.
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Digest(a), Self::Digest(b)) => a == b,
            (Self::Fallback { .. } | Self::Recovered { .. } | Self::Reset { .. }, _)
            | (_, Self::Fallback { .. } | Self::Recovered { .. } | Self::Reset { .. }) => false,
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest(hex) => write!(f, "{hex}"),
            Self::Fallback { size } => write!(f, "{FALLBACK_PREFIX}{size}"),
            Self::Recovered { size, mtime } => write!(f, "{RECOVERED_PREFIX}{size}-{mtime}"),
            Self::Reset { at } => write!(f, "{RESET_PREFIX}{at}"),
        }
    }
}

impl FromStr for Fingerprint {
    type Err = Infallible;

    /// Parsing never fails. Anything without a placeholder prefix is taken
    /// as a digest (older manifests may carry digests of another length).
    /// Placeholders with unparseable numbers keep their variant so they stay
    /// untrusted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix(RESET_PREFIX) {
            return Ok(Self::Reset { at: rest.parse().unwrap_or_default() });
        }
        if let Some(rest) = s.strip_prefix(RECOVERED_PREFIX) {
            let (size, mtime) = rest.split_once('-').unwrap_or((rest, ""));
            return Ok(Self::Recovered {
                size: size.parse().unwrap_or_default(),
                mtime: mtime.parse().unwrap_or_default(),
            });
        }
        if let Some(rest) = s.strip_prefix(FALLBACK_PREFIX) {
            return Ok(Self::Fallback { size: rest.parse().unwrap_or_default() });
        }
        Ok(Self::Digest(s.to_string()))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // Infallible.
        Ok(s.parse().unwrap_or_else(|never: Infallible| match never {}))
    }
}

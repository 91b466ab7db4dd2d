use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Full, merged configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root folder books are imported into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    pub import: ImportConfig,
    pub manifest: ManifestConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Pages materialized concurrently; batches run one after another.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_pause_ms: u64,
    /// Write stroke data as SVG artifacts.
    pub strokes: bool,
    pub audio: bool,
    /// `transparent`, `white` or `#rrggbb`. See [`Background`].
    pub background: String,
    pub transcribe: bool,
}
impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause_ms: 50,
            strokes: false,
            audio: true,
            background: Background::Transparent.to_string(),
            transcribe: false,
        }
    }
}
impl ImportConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    /// Parsed background setting. Validated configurations always parse;
    /// anything else falls back to transparent.
    pub fn background(&self) -> Background {
        self.background.parse().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Copy the manifest aside before every run that rewrites it.
    pub backup: bool,
    pub history_limit: usize,
}
impl Default for ManifestConfig {
    fn default() -> Self {
        Self { backup: true, history_limit: 50 }
    }
}

/// Background applied to page images before they are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Background {
    /// Leave the bitmap as it is.
    #[default]
    Transparent,
    White,
    Color([u8; 3]),
}

impl Background {
    /// The fill colour, or `None` when nothing is to be applied.
    pub fn rgb(&self) -> Option<[u8; 3]> {
        match self {
            Self::Transparent => None,
            Self::White => Some([0xff, 0xff, 0xff]),
            Self::Color(rgb) => Some(*rgb),
        }
    }
}

impl Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transparent => f.write_str("transparent"),
            Self::White => f.write_str("white"),
            Self::Color([r, g, b]) => write!(f, "#{r:02x}{g:02x}{b:02x}"),
        }
    }
}

impl FromStr for Background {
    type Err = String;

    /// ```
    /// use quill_config::Background;
    /// assert_eq!("White".parse(), Ok(Background::White));
    /// assert_eq!("#FFf0A0".parse(), Ok(Background::Color([0xff, 0xf0, 0xa0])));
    /// assert!("#fff".parse::<Background>().is_err());
    /// assert!("#+f+f+f".parse::<Background>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("transparent") || s.eq_ignore_ascii_case("none") {
            return Ok(Self::Transparent);
        }
        if s.eq_ignore_ascii_case("white") {
            return Ok(Self::White);
        }
        let invalid = || format!("background must be \"transparent\", \"white\" or \"#rrggbb\", got {s:?}");
        let hex = s
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(invalid)?;
        let mut rgb = [0u8; 3];
        for (index, channel) in rgb.iter_mut().enumerate() {
            *channel = u8::from_str_radix(&hex[index * 2..index * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self::Color(rgb))
    }
}

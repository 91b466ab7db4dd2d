use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

/// Presence of this entry marks a generation-2 archive; it is also the page
/// resource manifest of that generation.
pub(crate) const GEN2_MARKER: &str = "pageResource.json";
pub(crate) const GEN2_METADATA: &str = "info.json";
pub(crate) const GEN1_PAGE_LIST: &str = "pages.json";
pub(crate) const GEN1_METADATA: &str = "note.json";
pub(crate) const GEN1_STROKE_DIR: &str = "strokes";

/// Resource type tag of a page's main bitmap (generation 2).
pub(crate) const RESOURCE_BITMAP: &str = "MAINBMP";
/// Resource type tag of a page's stroke paths (generation 2).
pub(crate) const RESOURCE_STROKES: &str = "PATH";

pub(crate) const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];
pub(crate) const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "wav", "ogg", "opus", "amr"];
pub(crate) const THUMBNAIL_STEMS: &[&str] = &["thumbnail", "cover"];

// First integer after an "audio..." folder, then anywhere after "audio".
regex!(AUDIO_FOLDER_INDEX_REGEX, r"(?i)audio[^/]*/\D*(\d+)");
regex!(AUDIO_INDEX_REGEX, r"(?i)audio\D*(\d+)");

mod book;
mod page;
mod strokes;

pub use self::book::{Book, Generation};
pub use self::page::{AudioClip, Page, PageImage};
pub use self::strokes::{Stroke, StrokeData};

/// Lowercased extension of an archive entry name, if any.
pub(crate) fn extension(name: &str) -> Option<String> {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).filter(|ext| !ext.is_empty())
}

/// File name of an archive entry without its folder or extension.
pub(crate) fn stem(name: &str) -> &str {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file)
}

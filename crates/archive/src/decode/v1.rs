//! Generation 1: a flat `pages.json` list plus numerically named images.

use exn::{OptionExt, ResultExt};
use serde_json::Value;
use std::io::{Read, Seek};

use super::{Container, PageSource, folder_of};
use crate::consts::{GEN1_PAGE_LIST, GEN1_STROKE_DIR, GEN2_MARKER, IMAGE_EXTENSIONS, THUMBNAIL_STEMS};
use crate::error::{ErrorKind, Result};
use crate::models::{extension, stem};

pub(crate) fn page_sources<R: Read + Seek>(container: &mut Container<R>) -> Result<Vec<PageSource>> {
    let list = container
        .locate(GEN1_PAGE_LIST)
        .ok_or_raise(|| ErrorKind::InvalidArchive(format!("neither {GEN2_MARKER} nor {GEN1_PAGE_LIST} found")))?;
    let base = folder_of(&list).to_string();
    let items = match container.read_json::<Value>(&list)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("pages") {
            Some(Value::Array(items)) => items,
            _ => exn::bail!(ErrorKind::InvalidArchive(format!("{GEN1_PAGE_LIST} has no pages array"))),
        },
        _ => exn::bail!(ErrorKind::InvalidArchive(format!("{GEN1_PAGE_LIST} is not a list"))),
    };

    let mut sources = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let number = u32::try_from(index + 1).or_raise(|| ErrorKind::InvalidArchive("too many pages".to_string()))?;
        let image = match item.get("image").or(Some(item)).and_then(Value::as_str) {
            Some(path) => Some(container.resolve(&base, path)),
            None => numbered_image(container.entries(), number),
        };
        let strokes = match item.get("strokes").and_then(Value::as_str) {
            Some(path) => container.resolve(&base, path),
            None => format!("{base}{GEN1_STROKE_DIR}/{number}.json"),
        };
        sources.push(PageSource { number, image, strokes: Some(strokes) });
    }
    Ok(sources)
}

/// First image entry, in any folder, whose file stem is the page number.
fn numbered_image(entries: &[String], number: u32) -> Option<String> {
    let wanted = number.to_string();
    entries
        .iter()
        .filter(|entry| !entry.contains(&format!("{GEN1_STROKE_DIR}/")))
        .filter(|entry| !THUMBNAIL_STEMS.contains(&stem(entry)))
        .find(|entry| stem(entry) == wanted && extension(entry).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str())))
        .cloned()
}

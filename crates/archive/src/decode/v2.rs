//! Generation 2: typed page resources listed in `pageResource.json`.

use exn::ResultExt;
use serde::Deserialize;
use std::io::{Read, Seek};

use super::{Container, PageSource, folder_of};
use crate::consts::{GEN2_MARKER, RESOURCE_BITMAP, RESOURCE_STROKES};
use crate::error::{ErrorKind, Result};

#[derive(Debug, Deserialize)]
struct ResourceManifest {
    #[serde(default)]
    pages: Option<Vec<ResourcePage>>,
}

#[derive(Debug, Deserialize)]
struct ResourcePage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

impl ResourcePage {
    fn resource(&self, kind: &str) -> Option<&str> {
        self.resources.iter().find(|r| r.kind.eq_ignore_ascii_case(kind)).map(|r| r.path.as_str())
    }
}

pub(crate) fn page_sources<R: Read + Seek>(container: &mut Container<R>, marker: &str) -> Result<Vec<PageSource>> {
    let base = folder_of(marker).to_string();
    let manifest: ResourceManifest = container.read_json(marker)?;
    let Some(pages) = manifest.pages else {
        exn::bail!(ErrorKind::InvalidArchive(format!("{GEN2_MARKER} has no pages array")));
    };

    let mut sources = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        let number = u32::try_from(index + 1).or_raise(|| ErrorKind::InvalidArchive("too many pages".to_string()))?;
        let image = page.resource(RESOURCE_BITMAP).map(|path| container.resolve(&base, path));
        if image.is_none() {
            tracing::debug!(page = number, id = page.id.as_deref(), "Page resource list has no bitmap");
        }
        let strokes = page.resource(RESOURCE_STROKES).map(|path| container.resolve(&base, path));
        sources.push(PageSource { number, image, strokes });
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use crate::decode::tests::archive;
    use crate::error::ErrorKind;
    use crate::{DecodeOptions, Generation, decode_bytes};

    const RESOURCES: &[u8] = br#"{"pages": [
        {"id": "p-a", "resources": [
            {"type": "MAINBMP", "path": "res/a.png"},
            {"type": "PATH", "path": "res/a.json"},
            {"type": "THUMB", "path": "res/a-small.png"}
        ]},
        {"id": "p-b", "resources": [{"type": "PATH", "path": "res/b.json"}]},
        {"id": "p-c", "resources": [{"type": "MAINBMP", "path": "res/c.png"}]}
    ]}"#;

    #[test]
    fn test_resource_types() {
        let bytes = archive(&[
            ("pageResource.json", RESOURCES),
            ("info.json", br#"{"name": "Field Journal"}"#),
            ("res/a.png", b"a"),
            ("res/a.json", br#"{"strokes": []}"#),
            ("res/a-small.png", b"small"),
            ("res/c.png", b"c"),
            ("audio/3.m4a", b"voice"),
        ]);
        let options = DecodeOptions { strokes: true, ..Default::default() };
        let book = decode_bytes(&bytes, "journal.note", &options).unwrap();
        assert_eq!(book.generation, Generation::V2);
        assert_eq!(book.name, "Field Journal");
        // Page 2 has no bitmap and is dropped; page 3 keeps its number.
        assert_eq!(book.page_numbers(), vec![1, 3]);
        assert_eq!(book.pages[0].image.bytes, b"a");
        assert!(book.pages[0].strokes.is_some());
        assert!(book.pages[1].strokes.is_none());
        assert_eq!(book.page(3).unwrap().audio.as_ref().unwrap().entry, "audio/3.m4a");
    }

    #[test]
    fn test_nested_marker_resolves_relative_paths() {
        let bytes = archive(&[
            ("Note/pageResource.json", br#"{"pages": [{"resources": [{"type": "MAINBMP", "path": "1.png"}]}]}"#),
            ("Note/1.png", b"one"),
        ]);
        let book = decode_bytes(&bytes, "note.note", &DecodeOptions::default()).unwrap();
        assert_eq!(book.pages[0].image.entry, "Note/1.png");
    }

    #[test]
    fn test_missing_pages_array() {
        let bytes = archive(&[("pageResource.json", br#"{"version": 2}"#)]);
        let err = decode_bytes(&bytes, "book.note", &DecodeOptions::default()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive(_)));
    }

    #[test]
    fn test_malformed_resource_manifest() {
        let bytes = archive(&[("pageResource.json", b"{]")]);
        let err = decode_bytes(&bytes, "book.note", &DecodeOptions::default()).unwrap_err();
        assert_eq!(*err, ErrorKind::Json("pageResource.json".to_string()));
    }
}

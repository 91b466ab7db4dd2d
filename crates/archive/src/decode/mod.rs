//! Decoding of note archives into a [`Book`].
//!
//! Both archive generations are zip containers. They differ only in how the
//! page list is described, so each generation module produces a list of
//! [`PageSource`] records and everything else (reading bitmaps, strokes,
//! audio, thumbnails) is shared.

mod v1;
mod v2;

use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::{Cursor, Read, Seek};
use tracing::instrument;
use zip::ZipArchive;

use crate::audio::AudioResolver;
use crate::consts::{GEN1_METADATA, GEN2_MARKER, GEN2_METADATA, IMAGE_EXTENSIONS, THUMBNAIL_STEMS};
use crate::error::{ErrorKind, Result};
use crate::models::{AudioClip, Book, Generation, Page, PageImage, StrokeData, extension, stem};
use crate::Fingerprint;

/// Upper bound on buffer pre-allocation; entry headers declare sizes the
/// data doesn't have to match.
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared).unwrap_or(usize::MAX).min(MAX_PREALLOCATION)
}

/// Knobs that control how much of an archive gets decompressed.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Read and parse stroke entries. Off by default: strokes are only
    /// needed when SVG output is requested.
    pub strokes: bool,
    /// Attach audio recordings to pages.
    pub audio: bool,
    pub resolver: AudioResolver,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { strokes: false, audio: true, resolver: AudioResolver::default() }
    }
}

/// Where a page's parts live inside the container, before anything is read.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PageSource {
    pub number: u32,
    pub image: Option<String>,
    pub strokes: Option<String>,
}

/// Decodes an archive from any seekable reader.
///
/// `file_name` is the name of the archive on disk; it becomes the book's
/// source and, when the archive carries no name of its own, the book name.
///
/// Fails only when the container can't be opened or its page list is
/// missing or malformed. Individual pages whose bitmap can't be found are
/// dropped (with a warning) and keep their number gap.
#[instrument(skip(reader, options), fields(generation, pages))]
pub fn decode<R: Read + Seek>(reader: R, file_name: &str, options: &DecodeOptions) -> Result<Book> {
    let mut container = Container::open(reader)?;
    let (generation, sources, metadata) = if let Some(marker) = container.locate(GEN2_MARKER) {
        let sources = v2::page_sources(&mut container, &marker)?;
        (Generation::V2, sources, container.metadata(GEN2_METADATA))
    } else {
        let sources = v1::page_sources(&mut container)?;
        (Generation::V1, sources, container.metadata(GEN1_METADATA))
    };
    tracing::Span::current().record("generation", tracing::field::display(generation));

    let numbers: Vec<u32> = sources.iter().map(|s| s.number).collect();
    let audio = match options.audio {
        true => options.resolver.resolve(&container.entries, &numbers),
        false => Default::default(),
    };

    let mut pages = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(image_entry) = source.image.filter(|entry| container.contains(entry)) else {
            tracing::warn!(page = source.number, "Dropping page without a bitmap");
            continue;
        };
        let image = container.read_image(&image_entry);
        let strokes = match (options.strokes, source.strokes) {
            (true, Some(entry)) if container.contains(&entry) => container.read_strokes(&entry),
            _ => None,
        };
        let audio = match audio.get(&source.number) {
            Some(entry) => container.read_audio(entry),
            None => None,
        };
        pages.push(Page { number: source.number, image, strokes, audio });
    }
    tracing::Span::current().record("pages", pages.len());

    Ok(Book {
        name: book_name(&metadata, file_name),
        source: file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).to_string(),
        generation,
        metadata,
        pages,
        thumbnail: container.thumbnail(),
    })
}

/// Convenience wrapper around [`decode`] for archives already in memory.
pub fn decode_bytes(bytes: &[u8], file_name: &str, options: &DecodeOptions) -> Result<Book> {
    self::decode(Cursor::new(bytes), file_name, options)
}

/// Metadata `name` (or `title`), otherwise the archive's file stem.
fn book_name(metadata: &Value, file_name: &str) -> String {
    ["name", "title"]
        .iter()
        .filter_map(|key| metadata.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| stem(file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)).to_string())
}

/// Folder part of an entry name, including the trailing slash.
pub(crate) fn folder_of(entry: &str) -> &str {
    entry.rfind('/').map(|index| &entry[..=index]).unwrap_or_default()
}

pub(crate) struct Container<R> {
    zip: ZipArchive<R>,
    /// File entries (no directories), sorted.
    entries: Vec<String>,
}

impl<R: Read + Seek> Container<R> {
    fn open(reader: R) -> Result<Self> {
        let zip = ZipArchive::new(reader).or_raise(|| ErrorKind::Archive)?;
        let mut entries: Vec<String> = zip.file_names().filter(|name| !name.ends_with('/')).map(str::to_string).collect();
        entries.sort_unstable();
        tracing::debug!(entries = entries.len(), "Opened archive container");
        Ok(Self { zip, entries })
    }

    pub(crate) fn entries(&self) -> &[String] {
        &self.entries
    }

    pub(crate) fn contains(&self, entry: &str) -> bool {
        self.entries.binary_search_by(|e| e.as_str().cmp(entry)).is_ok()
    }

    /// The shallowest entry with exactly this file name, in any folder.
    pub(crate) fn locate(&self, file_name: &str) -> Option<String> {
        self.entries
            .iter()
            .filter(|entry| entry.rsplit('/').next() == Some(file_name))
            .min_by_key(|entry| entry.matches('/').count())
            .cloned()
    }

    /// Resolves a path found inside a structural entry. Paths are relative
    /// to the folder of that entry, but some exporters write them relative
    /// to the archive root instead.
    pub(crate) fn resolve(&self, base: &str, path: &str) -> String {
        let path = path.trim_start_matches("./").trim_start_matches('/');
        let relative = format!("{base}{path}");
        if !self.contains(&relative) && self.contains(path) {
            return path.to_string();
        }
        relative
    }

    /// Reads a structural entry completely; any failure is an error.
    pub(crate) fn read(&mut self, entry: &str) -> Result<Vec<u8>> {
        let mut file = self.zip.by_name(entry).or_raise(|| ErrorKind::MissingEntry(entry.to_string()))?;
        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut bytes).or_raise(|| ErrorKind::Archive)?;
        Ok(bytes)
    }

    pub(crate) fn read_json<T: DeserializeOwned>(&mut self, entry: &str) -> Result<T> {
        let bytes = self.read(entry)?;
        serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Json(entry.to_string()))
    }

    /// Optional metadata entry. Anything wrong with it is logged and the
    /// book simply has no metadata.
    fn metadata(&mut self, file_name: &str) -> Value {
        let Some(entry) = self.locate(file_name) else {
            return Value::Null;
        };
        match self.read_json::<Value>(&entry) {
            Ok(metadata) => metadata,
            Err(err) => {
                tracing::warn!(entry = entry.as_str(), error = ?err, "Ignoring unreadable metadata");
                Value::Null
            },
        }
    }

    /// Reads a page bitmap. A partial read keeps the bytes that did come
    /// through and switches to a size-based fallback fingerprint.
    fn read_image(&mut self, entry: &str) -> PageImage {
        let mut file = match self.zip.by_name(entry) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(entry, error = ?err, "Bitmap entry could not be opened");
                return PageImage { entry: entry.to_string(), bytes: Vec::new(), fingerprint: Fingerprint::fallback(0) };
            },
        };
        let declared = file.size();
        let mut bytes = Vec::new();
        match file.read_to_end(&mut bytes) {
            Ok(_) => PageImage::new(entry, bytes),
            Err(err) => {
                tracing::warn!(entry, declared, read = bytes.len(), error = ?err, "Bitmap entry read incompletely");
                PageImage { entry: entry.to_string(), bytes, fingerprint: Fingerprint::fallback(declared) }
            },
        }
    }

    fn read_strokes(&mut self, entry: &str) -> Option<StrokeData> {
        match self.read_json::<StrokeData>(entry) {
            Ok(strokes) => Some(strokes),
            Err(err) => {
                tracing::warn!(entry, error = ?err, "Ignoring unreadable stroke data");
                None
            },
        }
    }

    fn read_audio(&mut self, entry: &str) -> Option<AudioClip> {
        match self.read(entry) {
            Ok(bytes) => Some(AudioClip { entry: entry.to_string(), bytes }),
            Err(err) => {
                tracing::warn!(entry, error = ?err, "Ignoring unreadable audio entry");
                None
            },
        }
    }

    fn thumbnail(&mut self) -> Option<Vec<u8>> {
        let entry = self
            .entries
            .iter()
            .find(|entry| {
                THUMBNAIL_STEMS.contains(&stem(entry).to_ascii_lowercase().as_str())
                    && extension(entry).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            })?
            .clone();
        self.read(&entry).ok()
    }
}

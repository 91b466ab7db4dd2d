use super::error::{ErrorKind, Result};
use super::{Context, PageOutcome};
use crate::analyze::ChangeKind;
use crate::compose::{ARTIFACT_EXTENSION, compose};
use crate::document::{self, PageView, ParsedDocument};
use crate::transcribe::Transcription;
use exn::ResultExt;
use quill_archive::{Book, Page};
use quill_manifest::PageRecord;
use std::path::Path;
use tracing::instrument;

const SVG_EXTENSION: &str = "svg";

/// Materializes one page: image, audio and stroke artifacts as needed, then
/// the page document.
///
/// Artifacts of an unchanged page are only written when they are missing
/// (or, for the image, when the background setting changed since). The page
/// document is always rendered and written.
#[instrument(skip_all, fields(page = page.number, status = %status))]
pub(super) async fn import_page(
    ctx: &Context<'_>,
    book: &Book,
    page: &Page,
    status: ChangeKind,
    previous: Option<&PageRecord>,
) -> Result<PageOutcome> {
    let layout = ctx.layout;
    let changed = status != ChangeKind::Unchanged;
    let mut artifacts_written = Vec::new();

    // Image.
    let background = ctx.settings.background();
    let background_text = background.to_string();
    let image_path = layout.artifact_path(page.number, ARTIFACT_EXTENSION);
    let background_changed = previous.is_none_or(|r| r.background != background_text);
    let display_hash = if changed || background_changed || !exists(ctx, &image_path).await? {
        let composed = compose(&page.image.bytes, background).or_raise(|| ErrorKind::Image)?;
        write_blob(ctx, &image_path, &composed.bytes).await?;
        artifacts_written.push(image_path);
        composed.display_hash
    } else {
        tracing::debug!("Image artifact is up to date");
        previous.and_then(|r| r.display_hash.clone())
    };

    // Audio.
    let mut audio_link = None;
    if ctx.settings.audio
        && let Some(clip) = &page.audio
    {
        let extension = clip.extension();
        let path = layout.artifact_path(page.number, &extension);
        if changed || previous.is_none_or(|r| !r.has_audio) || !exists(ctx, &path).await? {
            write_blob(ctx, &path, &clip.bytes).await?;
            artifacts_written.push(path);
        } else {
            tracing::debug!("Audio artifact is up to date");
        }
        audio_link = Some(layout.artifact_link(page.number, &extension));
    }

    // Strokes.
    let mut svg_link = None;
    if ctx.settings.strokes
        && let Some(strokes) = page.strokes.as_ref().filter(|s| !s.is_empty())
    {
        let path = layout.artifact_path(page.number, SVG_EXTENSION);
        if changed || !exists(ctx, &path).await? {
            write_blob(ctx, &path, strokes.to_svg().as_bytes()).await?;
            artifacts_written.push(path);
        } else {
            tracing::debug!("Stroke artifact is up to date");
        }
        svg_link = Some(layout.artifact_link(page.number, SVG_EXTENSION));
    }

    // Transcription.
    let document_path = layout.document_path(page.number);
    let existing = if changed { ParsedDocument::default() } else { read_document(ctx, &document_path).await };
    let transcription = match existing.transcription {
        Some(text) => Some(Transcription { text, tags: existing.tags }),
        None => transcribe(ctx, page).await,
    };

    let view = PageView {
        book: &book.name,
        page: page.number,
        source: &book.source,
        image_hash: &page.image.fingerprint,
        display_hash: display_hash.as_ref(),
        imported: ctx.now,
        tags: transcription.as_ref().map(|t| t.tags.as_slice()).unwrap_or_default(),
        image: layout.artifact_link(page.number, ARTIFACT_EXTENSION),
        audio: audio_link,
        svg: svg_link,
        transcription: transcription.as_ref().map(|t| t.text.as_str()),
    };
    let text = view.render(ctx.renderer).or_raise(|| ErrorKind::Template)?;
    let has_audio = view.audio.is_some();
    ctx.backend.write(&document_path, text.as_bytes()).await.or_raise(|| ErrorKind::Write(document_path.clone()))?;

    let record = PageRecord {
        file: layout.document_name(page.number),
        imported: previous.filter(|_| !changed).map_or(ctx.now, |r| r.imported),
        image_hash: page.image.fingerprint.clone(),
        display_hash,
        transcribed: transcription.is_some(),
        has_audio,
        modified: ctx.now,
        size: page.image.bytes.len() as u64,
        background: background_text,
    };
    Ok(PageOutcome { page: page.number, status, record, artifacts_written })
}

async fn exists(ctx: &Context<'_>, path: &Path) -> Result<bool> {
    ctx.backend.exists(path).await.or_raise(|| ErrorKind::Read(path.to_path_buf()))
}

async fn write_blob(ctx: &Context<'_>, path: &Path, data: &[u8]) -> Result<()> {
    tracing::debug!(path = %path.display(), bytes = data.len(), "Writing artifact");
    ctx.backend.write_blob(path, data).await.or_raise(|| ErrorKind::Write(path.to_path_buf()))
}

/// The current document of an unchanged page, for carrying its
/// transcription over. A missing or unreadable document just means there's
/// nothing to carry over.
async fn read_document(ctx: &Context<'_>, path: &Path) -> ParsedDocument {
    match ctx.backend.read(path).await {
        Ok(bytes) => document::parse(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            tracing::debug!(error = ?err, "No existing page document");
            ParsedDocument::default()
        },
    }
}

async fn transcribe(ctx: &Context<'_>, page: &Page) -> Option<Transcription> {
    let transcriber = ctx.transcriber?;
    match transcriber.transcribe(&page.image.bytes).await {
        Ok(transcription) if !transcription.text.trim().is_empty() => Some(transcription),
        Ok(_) => {
            tracing::debug!(transcriber = transcriber.name(), "Transcription came back empty");
            None
        },
        Err(err) => {
            tracing::warn!(transcriber = transcriber.name(), error = ?err, "Transcription failed, leaving page pending");
            None
        },
    }
}

//! Page documents: what goes into them and what can be read back out.
//!
//! ```markdown
//! ---
//! book: "Field Journal"
//! page: 3
//! source: "field-journal.note"
//! image_hash: 9f2c44d1a0b3e5f7
//! display_hash: 01ab23cd45ef6789
//! imported: 2024-05-01T10:00:00Z
//! tags: ["birds", "spring"]
//! ---
//!
//! # Field Journal, page 3
//!
//! ## Audio
//!
//! ![[assets/field-journal-page-003.m4a]]
//!
//! ![[assets/field-journal-page-003.png]]
//!
//! ## Transcription
//!
//! Saw a heron by the weir.
//! ```
//!
//! Documents are rewritten from scratch on every import; reading one back is
//! only ever needed for the embedded fingerprint, the section markers and
//! the transcription block.

use crate::templates::{Renderer, quote};
use crate::error::Result;
use quill_archive::Fingerprint;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(crate) const AUDIO_HEADING: &str = "## Audio";
pub(crate) const TRANSCRIPTION_HEADING: &str = "## Transcription";
pub(crate) const PENDING_MARKER: &str = "%% transcription pending %%";
const FRONT_MATTER_FENCE: &str = "---";

/// Everything a page document is rendered from.
#[derive(Debug, Clone)]
pub struct PageView<'a> {
    pub book: &'a str,
    pub page: u32,
    pub source: &'a str,
    pub image_hash: &'a Fingerprint,
    pub display_hash: Option<&'a Fingerprint>,
    pub imported: OffsetDateTime,
    pub tags: &'a [String],
    /// Link to the image artifact.
    pub image: String,
    pub audio: Option<String>,
    pub svg: Option<String>,
    pub transcription: Option<&'a str>,
}

impl PageView<'_> {
    pub fn render(&self, renderer: &Renderer) -> Result<String> {
        let tags = self.tags.iter().map(|t| quote(t)).collect::<Vec<_>>().join(", ");
        let transcription = self.transcription.map(str::trim).filter(|t| !t.is_empty());
        renderer.render_page(upon::value! {
            book: self.book,
            page: u64::from(self.page),
            source: self.source,
            image_hash: self.image_hash.to_string(),
            has_display_hash: self.display_hash.is_some(),
            display_hash: self.display_hash.map(ToString::to_string).unwrap_or_default(),
            imported: timestamp(self.imported),
            tags: tags,
            image: self.image.as_str(),
            has_audio: self.audio.is_some(),
            audio: self.audio.clone().unwrap_or_default(),
            has_svg: self.svg.is_some(),
            svg: self.svg.clone().unwrap_or_default(),
            has_transcription: transcription.is_some(),
            transcription: transcription.unwrap_or_default(),
        })
    }
}

/// RFC 3339 text of a timestamp, falling back to the unix timestamp for
/// dates RFC 3339 can't express.
pub(crate) fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// What could be read back from an existing page document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub image_hash: Option<Fingerprint>,
    pub has_audio: bool,
    /// The transcription block, or `None` if the page is still pending.
    pub transcription: Option<String>,
    pub tags: Vec<String>,
}

/// Reads a page document leniently: anything missing or unrecognised is
/// simply absent from the result.
pub fn parse(text: &str) -> ParsedDocument {
    let mut parsed = ParsedDocument::default();
    let mut lines = text.lines().peekable();

    if lines.peek().is_some_and(|l| l.trim_end() == FRONT_MATTER_FENCE) {
        lines.next();
        for line in lines.by_ref() {
            if line.trim_end() == FRONT_MATTER_FENCE {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "image_hash" if !value.is_empty() => {
                    parsed.image_hash = value.parse().ok();
                },
                "tags" => parsed.tags = parse_list(value),
                _ => {},
            }
        }
    }

    let mut transcription: Option<Vec<&str>> = None;
    for line in lines {
        if let Some(block) = transcription.as_mut() {
            block.push(line);
            continue;
        }
        match line.trim_end() {
            AUDIO_HEADING => parsed.has_audio = true,
            TRANSCRIPTION_HEADING => transcription = Some(Vec::new()),
            _ => {},
        }
    }
    parsed.transcription = transcription
        .map(|block| block.join("\n").trim().to_string())
        .filter(|t| !t.is_empty() && t != PENDING_MARKER);
    parsed
}

/// `["a", "b"]` or `[a, b]`.
fn parse_list(value: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(value) {
        return items;
    }
    let inner = value.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            serde_json::from_str::<String>(item).unwrap_or_else(|_| item.trim_matches('\'').to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn view<'a>(hash: &'a Fingerprint, tags: &'a [String]) -> PageView<'a> {
        PageView {
            book: "Field \"Journal\"",
            page: 3,
            source: "journal.note",
            image_hash: hash,
            display_hash: None,
            imported: datetime!(2024-05-01 10:00 UTC),
            tags,
            image: "assets/field-journal-page-003.png".to_string(),
            audio: None,
            svg: None,
            transcription: None,
        }
    }

    #[test]
    fn test_render_pending_page() {
        let renderer = Renderer::new().unwrap();
        let hash = Fingerprint::of(b"page three");
        let text = view(&hash, &[]).render(&renderer).unwrap();
        assert!(text.starts_with("---\nbook: \"Field \\\"Journal\\\"\"\npage: 3\n"));
        assert!(text.contains(&format!("image_hash: {hash}\n")));
        assert!(!text.contains("display_hash"));
        assert!(text.contains("imported: 2024-05-01T10:00:00Z\n"));
        assert!(text.contains("tags: []\n"));
        assert!(text.contains("![[assets/field-journal-page-003.png]]"));
        assert!(!text.contains(AUDIO_HEADING));
        assert!(!text.contains(".svg"));
        assert!(text.contains(PENDING_MARKER));

        let parsed = parse(&text);
        assert_eq!(parsed, ParsedDocument { image_hash: Some(hash), ..Default::default() });
    }

    #[test]
    fn test_render_full_page() {
        let renderer = Renderer::new().unwrap();
        let hash = Fingerprint::of(b"page three");
        let display = Fingerprint::of(b"composited");
        let tags = vec!["birds".to_string(), "river, weir".to_string()];
        let mut view = view(&hash, &tags);
        view.display_hash = Some(&display);
        view.audio = Some("assets/field-journal-page-003.m4a".to_string());
        view.svg = Some("assets/field-journal-page-003.svg".to_string());
        view.transcription = Some("Saw a heron.\n\nLater: two.\n");
        let text = view.render(&renderer).unwrap();

        assert!(text.contains(&format!("display_hash: {display}\n")));
        assert!(text.contains("![[assets/field-journal-page-003.m4a]]"));
        assert!(text.contains("![[assets/field-journal-page-003.svg]]"));
        assert!(!text.contains(PENDING_MARKER));
        let audio = text.find(AUDIO_HEADING).unwrap();
        let image = text.find("![[assets/field-journal-page-003.png]]").unwrap();
        let transcription = text.find(TRANSCRIPTION_HEADING).unwrap();
        assert!(audio < image && image < transcription);

        let parsed = parse(&text);
        assert_eq!(parsed.image_hash, Some(hash));
        assert!(parsed.has_audio);
        assert_eq!(parsed.transcription.as_deref(), Some("Saw a heron.\n\nLater: two."));
        // Commas inside quoted tags survive.
        assert_eq!(parsed.tags, tags);
    }

    #[test]
    fn test_parse_without_front_matter() {
        let parsed = parse("# Notes\n\n## Audio\n\n## Transcription\n\n%% transcription pending %%\n");
        assert_eq!(parsed.image_hash, None);
        assert!(parsed.has_audio);
        assert_eq!(parsed.transcription, None);
    }

    #[test]
    fn test_parse_sentinel_hash() {
        let parsed = parse("---\nimage_hash: RESET-1714557600000\n---\n");
        assert_eq!(parsed.image_hash, Some(Fingerprint::reset(1_714_557_600_000)));
    }
}

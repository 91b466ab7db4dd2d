//! Background compositing of page bitmaps.
//!
//! Device bitmaps are usually PNGs with a transparent background, which
//! renders badly on dark themes. With a background configured, the bitmap is
//! flattened onto a solid canvas before it is written. The image artifact is
//! always a PNG.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use quill_archive::Fingerprint;
use quill_config::Background;
use std::borrow::Cow;
use std::io::Cursor;

pub(crate) const ARTIFACT_EXTENSION: &str = "png";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Bytes to write as the image artifact.
#[derive(Debug)]
pub struct Composed<'a> {
    pub bytes: Cow<'a, [u8]>,
    /// Fingerprint of `bytes` when they differ from the original bitmap.
    pub display_hash: Option<Fingerprint>,
}

pub fn compose(original: &[u8], background: Background) -> Result<Composed<'_>> {
    let rgb = background.rgb();
    if rgb.is_none() && original.starts_with(PNG_MAGIC) {
        return Ok(Composed { bytes: Cow::Borrowed(original), display_hash: None });
    }
    let image = image::load_from_memory(original).or_raise(|| ErrorKind::Image)?;
    let flattened = match rgb {
        Some([r, g, b]) => {
            let foreground = image.to_rgba8();
            let mut canvas = RgbaImage::from_pixel(foreground.width(), foreground.height(), Rgba([r, g, b, 0xff]));
            imageops::overlay(&mut canvas, &foreground, 0, 0);
            DynamicImage::ImageRgba8(canvas)
        },
        // Other formats are only re-encoded.
        None => image,
    };
    let mut bytes = Vec::new();
    flattened.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).or_raise(|| ErrorKind::Image)?;
    let display_hash = Some(Fingerprint::of(&bytes));
    Ok(Composed { bytes: Cow::Owned(bytes), display_hash })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Bytes that pass for a PNG as long as nothing needs to decode them.
    pub(crate) fn fake_png(tag: &str) -> Vec<u8> {
        [PNG_MAGIC, tag.as_bytes()].concat()
    }

    /// A 2x1 PNG: one transparent pixel, one opaque red pixel.
    pub(crate) fn png() -> Vec<u8> {
        let mut image = RgbaImage::new(2, 1);
        image.put_pixel(1, 0, Rgba([0xff, 0, 0, 0xff]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(image).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn test_transparent_png_passes_through() {
        let original = png();
        let composed = compose(&original, Background::Transparent).unwrap();
        assert!(matches!(composed.bytes, Cow::Borrowed(_)));
        assert_eq!(composed.bytes.as_ref(), original.as_slice());
        assert!(composed.display_hash.is_none());
    }

    #[test]
    fn test_background_is_applied() {
        let original = png();
        let composed = compose(&original, Background::White).unwrap();
        assert_ne!(composed.bytes.as_ref(), original.as_slice());
        assert_eq!(composed.display_hash, Some(Fingerprint::of(composed.bytes.as_ref())));

        let output = image::load_from_memory(&composed.bytes).unwrap().to_rgba8();
        assert_eq!(output.get_pixel(0, 0), &Rgba([0xff, 0xff, 0xff, 0xff]));
        assert_eq!(output.get_pixel(1, 0), &Rgba([0xff, 0, 0, 0xff]));
    }

    #[test]
    fn test_undecodable_bitmap() {
        let err = compose(b"not an image", Background::Color([1, 2, 3])).unwrap_err();
        assert_eq!(*err, ErrorKind::Image);
    }
}

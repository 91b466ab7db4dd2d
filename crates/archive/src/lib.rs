//! Reading of handwritten-note archives.
//!
//! An archive is decoded into a [`Book`]: an ordered list of numbered
//! [`Page`]s, each carrying its raw bitmap and its [`Fingerprint`], plus
//! optional strokes and audio.

mod audio;
mod consts;
mod decode;
pub mod error;
mod fingerprint;
pub mod models;

pub use crate::audio::{AudioMatcher, AudioResolver, is_audio};
pub use crate::decode::{DecodeOptions, decode, decode_bytes};
pub use crate::fingerprint::{DIGEST_LEN, Fingerprint};
pub use crate::models::{AudioClip, Book, Generation, Page, PageImage, Stroke, StrokeData};

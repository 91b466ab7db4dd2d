use crate::error::Result;
use async_trait::async_trait;

/// Text recognised on a page, plus any tags the service attached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    pub tags: Vec<String>,
}

/// Turns a page bitmap into text.
///
/// Optional: without one, or when it fails, page documents keep the
/// "transcription pending" marker and the import carries on.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Name of the service, used for logging only.
    fn name(&self) -> &str;

    async fn transcribe(&self, image: &[u8]) -> Result<Transcription>;
}

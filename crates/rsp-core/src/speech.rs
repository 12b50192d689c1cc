use async_trait::async_trait;

use crate::{
    messaging::types::{AudioClip, OutgoingPayload},
    Result,
};

/// Text-to-speech collaborator: build a synthesis URL, then fetch its audio.
///
/// Both steps fail with [`crate::Error::Synthesis`].
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn audio_url(&self, text: &str, language: &str) -> Result<String>;

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;

    /// MIME type of the bytes returned by [`Self::fetch_bytes`].
    fn mime_type(&self) -> &str {
        "audio/mpeg"
    }

    /// Convenience: URL + fetch, wrapped as a voice-note payload.
    async fn synthesize(&self, text: &str, language: &str) -> Result<OutgoingPayload> {
        let url = self.audio_url(text, language)?;
        let bytes = self.fetch_bytes(&url).await?;
        Ok(OutgoingPayload::Audio(AudioClip {
            bytes,
            mime_type: self.mime_type().to_string(),
            is_voice_note: true,
        }))
    }
}

//! Speech adapter over the Google Translate TTS endpoint.
//!
//! The endpoint takes one short utterance per request and answers with MP3 bytes.

use std::time::Duration;

use async_trait::async_trait;
use rsp_core::{errors::Error, speech::SpeechSynthesizer, Result};

/// Longest text the endpoint accepts in a single request.
pub const MAX_TEXT_CHARS: usize = 200;

pub const DEFAULT_HOST: &str = "https://translate.google.com";

#[derive(Clone, Debug)]
pub struct GoogleTts {
    host: String,
    slow: bool,
    http: reqwest::Client,
}

impl GoogleTts {
    pub fn new(host: impl Into<String>, slow: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::External(format!("tts http client: {e}")))?;
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            slow,
            http,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    fn audio_url(&self, text: &str, language: &str) -> Result<String> {
        let text = text.trim();
        let len = text.chars().count();
        if len == 0 {
            return Err(Error::Synthesis("text is empty".to_string()));
        }
        if len > MAX_TEXT_CHARS {
            return Err(Error::Synthesis(format!(
                "text is {len} characters; at most {MAX_TEXT_CHARS} are supported"
            )));
        }

        let textlen = len.to_string();
        let speed = if self.slow { "0.24" } else { "1" };
        let url = reqwest::Url::parse_with_params(
            &format!("{}/translate_tts", self.host),
            &[
                ("ie", "UTF-8"),
                ("q", text),
                ("tl", language),
                ("total", "1"),
                ("idx", "0"),
                ("textlen", textlen.as_str()),
                ("client", "tw-ob"),
                ("prev", "input"),
                ("ttsspeed", speed),
            ],
        )
        .map_err(|e| Error::Synthesis(format!("invalid tts url: {e}")))?;

        Ok(url.into())
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("tts request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "tts request failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("tts body error: {e}")))?;
        if bytes.is_empty() {
            return Err(Error::Synthesis("tts returned no audio".to_string()));
        }

        tracing::debug!(bytes = bytes.len(), "fetched synthesized audio");
        Ok(bytes.to_vec())
    }
}

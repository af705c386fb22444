//! Speech-to-text backends.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use rival_types::RivalError;
use serde::Deserialize;
use tracing::debug;

use crate::segment::AudioSegment;

/// Converts an audio segment into text.  An empty string means nothing
/// intelligible was said.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, RivalError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// OpenAI-compatible `/audio/transcriptions` client (Whisper and friends).
pub struct WhisperHttpTranscriber {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WhisperHttpTranscriber {
    /// `base_url` is the API root, e.g. `https://api.openai.com/v1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }
}

#[async_trait]
impl Transcriber for WhisperHttpTranscriber {
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String, RivalError> {
        let wav = segment.to_wav()?;
        let file = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| RivalError::Transcription(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone());

        let mut request = self.client.post(self.endpoint()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: TranscriptionResponse = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RivalError::Transcription(e.to_string()))?
            .json()
            .await
            .map_err(|e| RivalError::Transcription(format!("bad response: {e}")))?;

        let text = response.text.trim().to_string();
        debug!(chars = text.len(), "transcription received");
        Ok(text)
    }
}

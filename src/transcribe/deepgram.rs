//! Deepgram pre-recorded transcription
//!
//! Sends the raw WAV bytes to `/v1/listen` and reads the first alternative
//! of the first channel.

use super::Transcriber;
use crate::error::TranscribeError;
use std::path::Path;
use std::time::Duration;

const DEEPGRAM_LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";

pub struct DeepgramTranscriber {
    api_key: String,
    model: String,
    timeout: Duration,
}

impl DeepgramTranscriber {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        }
    }
}

impl Transcriber for DeepgramTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        _prompt: Option<&str>,
    ) -> Result<String, TranscribeError> {
        let data = std::fs::read(audio).map_err(|e| {
            TranscribeError::AudioFile(format!("cannot read {}: {}", audio.display(), e))
        })?;

        let start = std::time::Instant::now();

        let mut request = ureq::post(DEEPGRAM_LISTEN_URL)
            .timeout(self.timeout)
            .query("model", &self.model)
            .query("smart_format", "true")
            .set("Authorization", &format!("Token {}", self.api_key))
            .set("Content-Type", "audio/wav");
        if !language.is_empty() {
            request = request.query("language", language);
        }

        let response = request.send_bytes(&data).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                TranscribeError::RemoteError(format!("Deepgram returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => {
                TranscribeError::NetworkError(format!("Request failed: {}", t))
            }
        })?;

        let json: serde_json::Value = response.into_json().map_err(|e| {
            TranscribeError::RemoteError(format!("Failed to parse response: {}", e))
        })?;

        let text = parse_transcript(&json)?;
        tracing::info!(
            "Deepgram transcription completed in {:.2}s",
            start.elapsed().as_secs_f32()
        );
        Ok(text)
    }
}

fn parse_transcript(json: &serde_json::Value) -> Result<String, TranscribeError> {
    let transcript = json
        .pointer("/results/channels/0/alternatives/0/transcript")
        .and_then(|v| v.as_str())
        .ok_or_else(|| TranscribeError::RemoteError("Response missing transcript".into()))?
        .trim();

    if transcript.is_empty() {
        return Err(TranscribeError::EmptyText);
    }
    Ok(transcript.to_string())
}

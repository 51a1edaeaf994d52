//! HTTP speech engines: OpenAI and Deepgram

use super::SpeechSynthesizer;
use crate::error::SpeechError;
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const DEEPGRAM_SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";

/// Upper bound on a downloaded answer
const MAX_AUDIO_BYTES: u64 = 50 * 1024 * 1024;

fn map_request_error(service: &str, e: ureq::Error) -> SpeechError {
    match e {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            SpeechError::Request(format!("{} returned {}: {}", service, code, body))
        }
        ureq::Error::Transport(t) => SpeechError::Request(format!("{}: {}", service, t)),
    }
}

/// Stream the response body into `out`
fn save_audio(response: ureq::Response, out: &Path) -> Result<(), SpeechError> {
    let mut audio = Vec::new();
    response
        .into_reader()
        .take(MAX_AUDIO_BYTES)
        .read_to_end(&mut audio)?;
    if audio.is_empty() {
        return Err(SpeechError::Request("empty audio response".into()));
    }
    std::fs::write(out, &audio)?;
    tracing::debug!("Saved {} bytes of speech to {:?}", audio.len(), out);
    Ok(())
}

pub struct OpenAiSpeech {
    api_key: String,
    model: String,
    voice: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct OpenAiSpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
    speed: f32,
}

impl OpenAiSpeech {
    pub fn new(api_key: &str, model: &str, voice: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
            timeout,
        }
    }

    fn request<'a>(&'a self, text: &'a str) -> OpenAiSpeechRequest<'a> {
        OpenAiSpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: text,
            response_format: "mp3",
            speed: 1.0,
        }
    }
}

impl SpeechSynthesizer for OpenAiSpeech {
    fn synthesize(&self, text: &str, _language: &str, out: &Path) -> Result<(), SpeechError> {
        let client = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = client
            .post(OPENAI_SPEECH_URL)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(self.request(text))
            .map_err(|e| map_request_error("OpenAI", e))?;
        save_audio(response, out)
    }
}

pub struct DeepgramSpeech {
    api_key: String,
    voice: String,
    timeout: Duration,
}

impl DeepgramSpeech {
    pub fn new(api_key: &str, voice: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            voice: voice.to_string(),
            timeout,
        }
    }
}

impl SpeechSynthesizer for DeepgramSpeech {
    fn synthesize(&self, text: &str, _language: &str, out: &Path) -> Result<(), SpeechError> {
        let client = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = client
            .post(DEEPGRAM_SPEAK_URL)
            .query("model", &self.voice)
            .set("Authorization", &format!("Token {}", self.api_key))
            .send_json(serde_json::json!({ "text": text }))
            .map_err(|e| map_request_error("Deepgram", e))?;
        save_audio(response, out)
    }
}

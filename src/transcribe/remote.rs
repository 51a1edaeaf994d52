//! Remote speech-to-text via an OpenAI-compatible API
//!
//! Used for both a self-hosted whisper server (the custom endpoint) and the
//! default OpenAI backend. The recorded file is uploaded as-is.

use super::Transcriber;
use crate::error::TranscribeError;
use std::path::Path;
use std::time::Duration;

/// Remote transcriber using the `/v1/audio/transcriptions` API
#[derive(Debug)]
pub struct RemoteTranscriber {
    /// Base endpoint URL (e.g., "http://192.168.1.100:8080")
    endpoint: String,
    /// Model name to send to server
    model: String,
    /// Optional API key for authentication
    api_key: Option<String>,
    /// Request timeout
    timeout: Duration,
}

impl RemoteTranscriber {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TranscribeError> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(TranscribeError::ConfigError(format!(
                "transcription endpoint must start with http:// or https://, got: {}",
                endpoint
            )));
        }

        // Warn about non-HTTPS for non-localhost endpoints
        if endpoint.starts_with("http://")
            && !endpoint.contains("localhost")
            && !endpoint.contains("127.0.0.1")
            && !endpoint.contains("[::1]")
        {
            tracing::warn!(
                "Transcription endpoint {} uses HTTP without TLS. Audio will be sent unencrypted!",
                endpoint
            );
        }

        tracing::debug!(
            "Configured remote transcriber: endpoint={}, model={}, timeout={}s",
            endpoint,
            model,
            timeout.as_secs()
        );

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.endpoint)
    }

    /// Build the multipart form body for the API request
    fn build_multipart_body(
        &self,
        file_name: &str,
        audio: &[u8],
        language: &str,
        prompt: Option<&str>,
    ) -> (String, Vec<u8>) {
        let boundary = format!(
            "----ChordvoxBoundary{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );

        let mut body = Vec::new();
        let mut field = |name: &str, value: &[u8]| {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            );
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        };

        field("model", self.model.as_bytes());
        if !language.is_empty() {
            field("language", language.as_bytes());
        }
        if let Some(prompt) = prompt.filter(|p| !p.is_empty()) {
            field("prompt", prompt.as_bytes());
        }
        field("temperature", b"0");
        field("response_format", b"json");

        // File field
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(audio);
        body.extend_from_slice(b"\r\n");

        // End boundary
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        (boundary, body)
    }
}

impl Transcriber for RemoteTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        prompt: Option<&str>,
    ) -> Result<String, TranscribeError> {
        let data = std::fs::read(audio).map_err(|e| {
            TranscribeError::AudioFile(format!("cannot read {}: {}", audio.display(), e))
        })?;
        if data.is_empty() {
            return Err(TranscribeError::AudioFile("recording is empty".into()));
        }

        let file_name = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav");

        tracing::debug!(
            "Sending {} bytes of audio to {}",
            data.len(),
            self.endpoint
        );
        let start = std::time::Instant::now();

        let (boundary, body) = self.build_multipart_body(file_name, &data, language, prompt);

        let mut request = ureq::post(&self.url()).timeout(self.timeout).set(
            "Content-Type",
            &format!("multipart/form-data; boundary={}", boundary),
        );

        if let Some(ref key) = self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request.send_bytes(&body).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                TranscribeError::RemoteError(format!("Server returned {}: {}", code, body))
            }
            ureq::Error::Transport(t) => {
                TranscribeError::NetworkError(format!("Request failed: {}", t))
            }
        })?;

        let json: serde_json::Value = response.into_json().map_err(|e| {
            TranscribeError::RemoteError(format!("Failed to parse response: {}", e))
        })?;

        let text = parse_text(&json)?;

        tracing::info!(
            "Remote transcription completed in {:.2}s ({} chars)",
            start.elapsed().as_secs_f32(),
            text.chars().count()
        );

        Ok(text)
    }
}

fn parse_text(json: &serde_json::Value) -> Result<String, TranscribeError> {
    let text = json
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            TranscribeError::RemoteError(format!("Response missing 'text' field: {}", json))
        })?
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(TranscribeError::EmptyText);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcriber() -> RemoteTranscriber {
        RemoteTranscriber::new(
            "http://localhost:8080/",
            "large-v3",
            None,
            Duration::from_secs(30),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_url() {
        let result =
            RemoteTranscriber::new("not-a-url", "whisper-1", None, Duration::from_secs(30));
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[test]
    fn test_url_strips_trailing_slash() {
        assert_eq!(
            transcriber().url(),
            "http://localhost:8080/v1/audio/transcriptions"
        );
    }

    #[test]
    fn test_multipart_body_structure() {
        let (boundary, body) =
            transcriber().build_multipart_body("rec.wav", &[0u8; 16], "fr", Some("Dictée: "));
        let body = String::from_utf8_lossy(&body);

        assert!(body.contains(&boundary));
        assert!(body.contains("name=\"file\"; filename=\"rec.wav\""));
        assert!(body.contains("name=\"model\"\r\n\r\nlarge-v3"));
        assert!(body.contains("name=\"language\"\r\n\r\nfr"));
        assert!(body.contains("name=\"prompt\"\r\n\r\nDictée: "));
        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn test_multipart_body_without_prompt() {
        let (_, body) = transcriber().build_multipart_body("rec.wav", &[1, 2], "en", None);
        let body = String::from_utf8_lossy(&body);
        assert!(!body.contains("name=\"prompt\""));
    }

    #[test]
    fn test_parse_text() {
        let json = serde_json::json!({ "text": "  hello world \n" });
        assert_eq!(parse_text(&json).unwrap(), "hello world");

        let empty = serde_json::json!({ "text": "   " });
        assert!(matches!(parse_text(&empty), Err(TranscribeError::EmptyText)));

        let missing = serde_json::json!({ "error": "nope" });
        assert!(matches!(
            parse_text(&missing),
            Err(TranscribeError::RemoteError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_audio_error() {
        let err = transcriber()
            .transcribe(Path::new("/nonexistent/chordvox.wav"), "en", None)
            .unwrap_err();
        assert!(matches!(err, TranscribeError::AudioFile(_)));
    }
}

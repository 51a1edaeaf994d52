//! Speech-to-text transcription module
//!
//! Provides transcription via:
//! - A custom OpenAI-compatible endpoint (self-hosted whisper server)
//! - The OpenAI Whisper API
//! - Deepgram
//!
//! The custom endpoint, when configured, is always tried first. It is
//! followed by OpenAI, or by Deepgram in `deepgram_only` mode; the two are
//! never combined in one chain.

pub mod deepgram;
pub mod remote;

use crate::config::TranscriptionConfig;
use crate::credentials::{self, ApiKeys};
use crate::error::{TaskError, TranscribeError};
use crate::fallback::FallbackChain;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Trait for speech-to-text implementations
pub trait Transcriber: Send + Sync {
    /// Transcribe a recorded audio file to text
    fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        prompt: Option<&str>,
    ) -> Result<String, TranscribeError>;
}

/// Ordered transcription backends
#[derive(Clone)]
pub struct TranscriptionChain {
    chain: FallbackChain<dyn Transcriber>,
}

impl TranscriptionChain {
    pub fn new(chain: FallbackChain<dyn Transcriber>) -> Self {
        Self { chain }
    }

    /// Build the chain from configuration
    ///
    /// Backends whose API key is missing are skipped with a warning, so an
    /// empty chain is possible and fails at transcription time. Deepgram
    /// only replaces OpenAI when `deepgram_only` is set; otherwise a failed
    /// OpenAI call exhausts the chain.
    pub fn from_config(config: &TranscriptionConfig, keys: &ApiKeys) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut chain: FallbackChain<dyn Transcriber> = FallbackChain::new("transcription");

        if let Some(ref endpoint) = config.custom_endpoint {
            match remote::RemoteTranscriber::new(
                endpoint,
                &config.model,
                config.custom_api_key.clone(),
                timeout,
            ) {
                Ok(t) => chain.push("custom", Arc::new(t)),
                Err(e) => tracing::warn!("Skipping custom transcription endpoint: {}", e),
            }
        }

        if config.deepgram_only {
            match keys.get(credentials::DEEPGRAM) {
                Some(key) => chain.push(
                    "deepgram",
                    Arc::new(deepgram::DeepgramTranscriber::new(
                        key,
                        &config.deepgram_model,
                        timeout,
                    )),
                ),
                None => tracing::warn!("Deepgram-only mode but no Deepgram API key"),
            }
        } else {
            match keys.get(credentials::OPENAI) {
                Some(key) => match remote::RemoteTranscriber::new(
                    &config.default_endpoint,
                    &config.model,
                    Some(key.to_string()),
                    timeout,
                ) {
                    Ok(t) => chain.push("openai", Arc::new(t)),
                    Err(e) => tracing::warn!("Skipping OpenAI transcription: {}", e),
                },
                None => tracing::warn!("No OpenAI API key, skipping OpenAI transcription"),
            }
        }

        tracing::info!("Transcription backends: {:?}", chain.names());
        Self { chain }
    }

    pub fn backends(&self) -> Vec<&str> {
        self.chain.names()
    }

    /// Transcribe with the first backend that produces non-empty text
    pub fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        prompt: Option<&str>,
    ) -> Result<String, TaskError> {
        self.chain
            .run(|backend| {
                let text = backend.transcribe(audio, language, prompt)?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(TranscribeError::EmptyText);
                }
                Ok(text.to_string())
            })
            .map_err(|exhausted| TaskError::TranscriptionExhausted(exhausted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Transcriber for Scripted {
        fn transcribe(
            &self,
            _audio: &Path,
            _language: &str,
            _prompt: Option<&str>,
        ) -> Result<String, TranscribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| TranscribeError::NetworkError("unreachable".into()))
        }
    }

    #[test]
    fn test_falls_back_after_failure() {
        let broken = Scripted::new(None);
        let working = Scripted::new(Some(" bonjour "));
        let chain = TranscriptionChain::new(
            FallbackChain::<dyn Transcriber>::new("transcription")
                .with("custom", broken.clone())
                .with("openai", working.clone()),
        );

        let text = chain.transcribe(Path::new("x.wav"), "fr", None).unwrap();
        assert_eq!(text, "bonjour");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_text_counts_as_failure() {
        let blank = Scripted::new(Some("   "));
        let backup = Scripted::new(Some("hello"));
        let chain = TranscriptionChain::new(
            FallbackChain::<dyn Transcriber>::new("transcription")
                .with("openai", blank)
                .with("deepgram", backup.clone()),
        );
        assert_eq!(
            chain.transcribe(Path::new("x.wav"), "en", None).unwrap(),
            "hello"
        );
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exhausted_chain_reports_every_attempt() {
        let chain = TranscriptionChain::new(
            FallbackChain::<dyn Transcriber>::new("transcription")
                .with("openai", Scripted::new(None))
                .with("deepgram", Scripted::new(None)),
        );
        let err = chain
            .transcribe(Path::new("x.wav"), "en", None)
            .unwrap_err();
        match err {
            TaskError::TranscriptionExhausted(summary) => {
                assert!(summary.contains("openai"));
                assert!(summary.contains("deepgram"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_from_config_order() {
        let config = TranscriptionConfig {
            custom_endpoint: Some("http://localhost:9000".into()),
            ..Default::default()
        };
        let keys = ApiKeys::default()
            .with_key(credentials::OPENAI, "sk-test")
            .with_key(credentials::DEEPGRAM, "dg-test");
        let chain = TranscriptionChain::from_config(&config, &keys);
        // Deepgram is not a fallback for OpenAI
        assert_eq!(chain.backends(), vec!["custom", "openai"]);
    }

    #[test]
    fn test_from_config_deepgram_only() {
        let keys = ApiKeys::default()
            .with_key(credentials::OPENAI, "sk-test")
            .with_key(credentials::DEEPGRAM, "dg-test");

        let config = TranscriptionConfig {
            deepgram_only: true,
            ..Default::default()
        };
        let chain = TranscriptionChain::from_config(&config, &keys);
        assert_eq!(chain.backends(), vec!["deepgram"]);

        // The custom endpoint still goes first
        let config = TranscriptionConfig {
            deepgram_only: true,
            custom_endpoint: Some("http://localhost:9000".into()),
            ..Default::default()
        };
        let chain = TranscriptionChain::from_config(&config, &keys);
        assert_eq!(chain.backends(), vec!["custom", "deepgram"]);
    }

    #[test]
    fn test_from_config_deepgram_only_without_key() {
        let config = TranscriptionConfig {
            deepgram_only: true,
            ..Default::default()
        };
        let keys = ApiKeys::default().with_key(credentials::OPENAI, "sk-test");
        let chain = TranscriptionChain::from_config(&config, &keys);
        assert!(chain.backends().is_empty());
    }

    #[test]
    fn test_from_config_skips_backends_without_keys() {
        let chain =
            TranscriptionChain::from_config(&TranscriptionConfig::default(), &ApiKeys::default());
        assert!(chain.backends().is_empty());
        assert!(matches!(
            chain.transcribe(Path::new("x.wav"), "en", None),
            Err(TaskError::TranscriptionExhausted(_))
        ));
    }
}

//! Text-to-speech for voice chat answers
//!
//! Engines:
//! - piper (local neural voices, one model per language)
//! - OpenAI `/v1/audio/speech`
//! - Deepgram `/v1/speak`
//! - espeak (always available fallback)
//!
//! The configured engine is tried first and espeak second.

pub mod local;
pub mod remote;

use crate::config::{SpeechConfig, VoiceEngine};
use crate::credentials::{self, ApiKeys};
use crate::error::{SpeechError, TaskError};
use crate::fallback::FallbackChain;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;

const SPEECH_TIMEOUT: Duration = Duration::from_secs(60);

/// Trait for speech synthesis engines
pub trait SpeechSynthesizer: Send + Sync {
    /// Write spoken `text` to the audio file at `out`
    fn synthesize(&self, text: &str, language: &str, out: &Path) -> Result<(), SpeechError>;
}

/// Registered synthesis engines
#[derive(Clone, Default)]
pub struct SpeechBackends {
    engines: Vec<(VoiceEngine, Arc<dyn SpeechSynthesizer>)>,
}

impl SpeechBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, engine: VoiceEngine, backend: Arc<dyn SpeechSynthesizer>) -> Self {
        self.engines.retain(|(e, _)| *e != engine);
        self.engines.push((engine, backend));
        self
    }

    /// Register every engine usable with the available keys
    pub fn from_config(config: &SpeechConfig, keys: &ApiKeys) -> Self {
        let mut backends = Self::new()
            .with(
                VoiceEngine::Piper,
                Arc::new(local::PiperSynthesizer::new(config.piper_models.clone())),
            )
            .with(
                VoiceEngine::Espeak,
                Arc::new(local::EspeakSynthesizer::new(
                    config.espeak_pitch,
                    config.espeak_speed,
                )),
            );

        if let Some(key) = keys.get(credentials::OPENAI) {
            backends = backends.with(
                VoiceEngine::Openai,
                Arc::new(remote::OpenAiSpeech::new(
                    key,
                    &config.openai_model,
                    &config.openai_voice,
                    SPEECH_TIMEOUT,
                )),
            );
        }
        if let Some(key) = keys.get(credentials::DEEPGRAM) {
            backends = backends.with(
                VoiceEngine::Deepgram,
                Arc::new(remote::DeepgramSpeech::new(
                    key,
                    &config.deepgram_voice,
                    SPEECH_TIMEOUT,
                )),
            );
        }

        backends
    }

    fn get(&self, engine: VoiceEngine) -> Option<Arc<dyn SpeechSynthesizer>> {
        self.engines
            .iter()
            .find(|(e, _)| *e == engine)
            .map(|(_, backend)| backend.clone())
    }

    /// The requested engine followed by espeak
    pub fn chain_for(&self, engine: VoiceEngine) -> FallbackChain<dyn SpeechSynthesizer> {
        let mut chain: FallbackChain<dyn SpeechSynthesizer> = FallbackChain::new("speech");
        if engine == VoiceEngine::None {
            return chain;
        }

        match self.get(engine) {
            Some(backend) => chain.push(engine_name(engine), backend),
            None => tracing::warn!(
                "Voice engine {} is not available, falling back to espeak",
                engine_name(engine)
            ),
        }
        if engine != VoiceEngine::Espeak {
            if let Some(espeak) = self.get(VoiceEngine::Espeak) {
                chain.push(engine_name(VoiceEngine::Espeak), espeak);
            }
        }
        chain
    }

    /// Synthesize `text` into a temporary audio file
    ///
    /// Returns `None` when `engine` is [`VoiceEngine::None`].
    pub fn synthesize(
        &self,
        engine: VoiceEngine,
        text: &str,
        language: &str,
    ) -> Result<Option<TempPath>, TaskError> {
        if engine == VoiceEngine::None {
            tracing::debug!("Voice engine is none, not speaking");
            return Ok(None);
        }

        let out = tempfile::Builder::new()
            .prefix("chordvox-speech-")
            .tempfile()
            .map_err(|e| TaskError::SynthesisExhausted(format!("temp file: {}", e)))?
            .into_temp_path();

        self.chain_for(engine)
            .run(|backend| backend.synthesize(text, language, &out))
            .map_err(|exhausted| TaskError::SynthesisExhausted(exhausted.to_string()))?;

        Ok(Some(out))
    }
}

pub fn engine_name(engine: VoiceEngine) -> &'static str {
    match engine {
        VoiceEngine::Piper => "piper",
        VoiceEngine::Openai => "openai",
        VoiceEngine::Deepgram => "deepgram",
        VoiceEngine::Espeak => "espeak",
        VoiceEngine::None => "none",
    }
}

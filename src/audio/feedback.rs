//! Audio feedback module
//!
//! Plays short cues (recording start/stop, task done, error) without
//! blocking the caller. Requests go through a queue to a single worker
//! thread that plays them one at a time, in submission order. The most
//! recent playback failure is kept for the caller to poll; older ones are
//! only logged.

use super::{PlayerFactory, SoundPlayer, SoundSource};
use crate::config::{expand_home, AudioFeedbackConfig};
use crate::error::AudioError;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Latest unreported playback failure
type ErrorSlot = Arc<Mutex<Option<AudioError>>>;

fn report(slot: &ErrorSlot, error: AudioError) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
}

/// Sound event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundEvent {
    /// Recording started
    RecordingStart,
    /// Recording stopped
    RecordingStop,
    /// Task finished
    Done,
    /// Task failed or was cancelled
    Error,
}

/// Sources for each cue, from config or generated
struct CueTheme {
    start: SoundSource,
    stop: SoundSource,
    done: SoundSource,
    error: SoundSource,
}

impl CueTheme {
    fn from_config(config: &AudioFeedbackConfig) -> Self {
        let pick = |path: &Option<std::path::PathBuf>, fallback: fn() -> Vec<u8>| match path {
            Some(path) => SoundSource::File(expand_home(path)),
            None => SoundSource::Embedded(Arc::new(fallback())),
        };

        Self {
            // Rising two-tone: 440Hz -> 880Hz
            start: pick(&config.start, || generate_two_tone_wav(440.0, 880.0, 150, 20)),
            // Falling two-tone: 880Hz -> 440Hz
            stop: pick(&config.stop, || generate_two_tone_wav(880.0, 440.0, 150, 20)),
            done: pick(&config.done, || generate_tone_wav(1200.0, 80, 10)),
            // Low warning tone
            error: pick(&config.error, || generate_two_tone_wav(300.0, 200.0, 200, 30)),
        }
    }

    fn source(&self, event: SoundEvent) -> &SoundSource {
        match event {
            SoundEvent::RecordingStart => &self.start,
            SoundEvent::RecordingStop => &self.stop,
            SoundEvent::Done => &self.done,
            SoundEvent::Error => &self.error,
        }
    }
}

/// Fire-and-forget cue player
pub struct SoundCue {
    enabled: bool,
    theme: CueTheme,
    players: PlayerFactory,
    queue: Mutex<Option<Sender<SoundSource>>>,
    last_error: ErrorSlot,
}

impl SoundCue {
    pub fn new(config: &AudioFeedbackConfig, players: PlayerFactory) -> Self {
        Self {
            enabled: config.enabled,
            theme: CueTheme::from_config(config),
            players,
            queue: Mutex::new(None),
            last_error: ErrorSlot::default(),
        }
    }

    /// Play the sound configured for `event`
    pub fn cue(&self, event: SoundEvent) {
        if !self.enabled {
            return;
        }
        self.enqueue(self.theme.source(event).clone());
    }

    /// Queue a sound file; returns immediately
    pub fn play(&self, path: impl Into<std::path::PathBuf>) {
        self.enqueue(SoundSource::File(path.into()));
    }

    /// Take the most recent playback failure since the last poll
    pub fn check_last_error(&self) -> Option<AudioError> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn enqueue(&self, source: SoundSource) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());

        let source = match queue.as_ref() {
            Some(tx) => match tx.send(source) {
                Ok(()) => return,
                Err(mpsc::SendError(source)) => {
                    tracing::warn!("Sound worker stopped, restarting it");
                    source
                }
            },
            None => source,
        };

        self.start_worker(&mut queue, source);
    }

    fn start_worker(&self, queue: &mut Option<Sender<SoundSource>>, first: SoundSource) {
        let (tx, rx) = mpsc::channel();
        let players = self.players.clone();
        let errors = self.last_error.clone();

        let spawned = std::thread::Builder::new()
            .name("sound-cue".to_string())
            .spawn(move || sound_worker(rx, players, errors));

        match spawned {
            Ok(_) => {
                // The worker owns the receiver, so this send cannot fail yet
                let _ = tx.send(first);
                *queue = Some(tx);
            }
            Err(e) => report(
                &self.last_error,
                AudioError::Output(format!("Failed to start sound worker: {}", e)),
            ),
        }
    }
}

fn sound_worker(rx: Receiver<SoundSource>, players: PlayerFactory, errors: ErrorSlot) {
    let mut player: Option<Box<dyn SoundPlayer>> = None;

    while let Ok(source) = rx.recv() {
        if player.is_none() {
            match players() {
                Ok(opened) => player = Some(opened),
                Err(e) => {
                    tracing::warn!("Failed to open audio output: {}", e);
                    report(&errors, e);
                    continue;
                }
            }
        }

        if let Some(player) = player.as_mut() {
            if let Err(e) = player.play(&source) {
                tracing::warn!("Failed to play feedback sound: {}", e);
                report(&errors, e);
            }
        }
    }

    tracing::debug!("Sound worker stopped");
}

// === Sound Generation ===
// Simple WAV tones used when no sound file is configured

/// Generate a simple WAV file with a sine wave tone
fn generate_tone_wav(frequency: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    generate_two_tone_wav(frequency, frequency, duration_ms, fade_ms)
}

/// Generate a two-tone sound (rising or falling)
fn generate_two_tone_wav(freq1: f32, freq2: f32, duration_ms: u32, fade_ms: u32) -> Vec<u8> {
    let sample_rate = 44100u32;
    let num_samples = (sample_rate * duration_ms / 1000) as usize;
    let fade_samples = ((sample_rate * fade_ms / 1000) as usize).max(1);
    let half_samples = num_samples / 2;

    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let freq = if i < half_samples { freq1 } else { freq2 };
            let mut amplitude = (2.0 * std::f32::consts::PI * freq * t).sin();

            // Fade in/out envelope
            if i < fade_samples {
                amplitude *= i as f32 / fade_samples as f32;
            } else if i + fade_samples >= num_samples {
                amplitude *= (num_samples - i) as f32 / fade_samples as f32;
            }

            (amplitude * 16000.0) as i16
        })
        .collect();

    encode_wav(&samples, sample_rate)
}

/// Encode mono 16-bit samples as WAV
fn encode_wav(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let mut wav = Vec::with_capacity(44 + samples.len() * 2);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&((36 + samples.len() * 2) as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&((samples.len() * 2) as u32).to_le_bytes());
    for sample in samples {
        wav.extend_from_slice(&sample.to_le_bytes());
    }

    wav
}

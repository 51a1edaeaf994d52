//! Audio output
//!
//! Sound cues and spoken answers are played through rodio. Playback happens
//! on dedicated threads because rodio's output stream cannot leave the
//! thread that opened it.

pub mod feedback;

use crate::error::AudioError;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Something the player can decode: a file, or bytes generated in memory
#[derive(Debug, Clone, PartialEq)]
pub enum SoundSource {
    File(PathBuf),
    Embedded(Arc<Vec<u8>>),
}

impl SoundSource {
    pub fn describe(&self) -> String {
        match self {
            SoundSource::File(path) => path.display().to_string(),
            SoundSource::Embedded(data) => format!("<{} bytes>", data.len()),
        }
    }
}

/// Plays one sound to completion
pub trait SoundPlayer {
    fn play(&mut self, source: &SoundSource) -> Result<(), AudioError>;
}

/// Opens a player on the calling thread
pub type PlayerFactory =
    Arc<dyn Fn() -> Result<Box<dyn SoundPlayer>, AudioError> + Send + Sync>;

/// rodio-backed player on the default output device
pub struct RodioPlayer {
    _stream: OutputStream,
    handle: OutputStreamHandle,
    volume: f32,
}

impl RodioPlayer {
    pub fn open(volume: f32) -> Result<Self, AudioError> {
        let (stream, handle) = OutputStream::try_default()
            .map_err(|e| AudioError::Output(format!("Failed to open audio output: {}", e)))?;
        Ok(Self {
            _stream: stream,
            handle,
            volume: volume.clamp(0.0, 1.0),
        })
    }

    /// Factory producing a fresh player per playback thread
    pub fn factory(volume: f32) -> PlayerFactory {
        Arc::new(move || Ok(Box::new(RodioPlayer::open(volume)?) as Box<dyn SoundPlayer>))
    }
}

impl SoundPlayer for RodioPlayer {
    fn play(&mut self, source: &SoundSource) -> Result<(), AudioError> {
        let failed = |reason: String| AudioError::Playback {
            path: source.describe(),
            reason,
        };

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| failed(format!("Failed to create audio sink: {}", e)))?;
        sink.set_volume(self.volume);

        match source {
            SoundSource::File(path) => {
                let file = std::fs::File::open(path).map_err(|e| failed(e.to_string()))?;
                let decoder = Decoder::new(BufReader::new(file))
                    .map_err(|e| failed(format!("Failed to decode audio: {}", e)))?;
                sink.append(decoder);
            }
            SoundSource::Embedded(data) => {
                let decoder = Decoder::new(Cursor::new((**data).clone()))
                    .map_err(|e| failed(format!("Failed to decode audio: {}", e)))?;
                sink.append(decoder);
            }
        }

        sink.sleep_until_end();
        Ok(())
    }
}

/// Play a file to the end on the current thread
///
/// Blocks; call from `spawn_blocking`.
pub fn play_to_end(players: &PlayerFactory, path: &Path) -> Result<(), AudioError> {
    let mut player = players()?;
    player.play(&SoundSource::File(path.to_path_buf()))
}

//! Error types for chordvox
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use thiserror::Error;

/// Top-level error type for the chordvox application
#[derive(Error, Debug)]
pub enum ChordvoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid chord binding '{key}': {reason}")]
    ChordBindingInvalid { key: String, reason: String },

    #[error("Hotkey error: {0}")]
    Hotkey(#[from] HotkeyError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Task failed: {0}")]
    Task(#[from] TaskError),

    #[error("Dispatcher gave up after {0} consecutive failures")]
    TooManyFailures(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to key event capture
#[derive(Error, Debug)]
pub enum HotkeyError {
    #[error("Cannot open input device '{0}'. Is the user in the 'input' group?\n  Run: sudo usermod -aG input $USER\n  Then log out and back in.")]
    DeviceAccess(String),

    #[error("Unknown key name: '{0}'. Use evtest or wev to find valid key names.")]
    UnknownKey(String),

    #[error("No keyboard device found in /dev/input/")]
    NoKeyboard,

    #[error("Key listener stopped: {0}")]
    ListenerStopped(String),

    #[error("Listener backend not supported on this platform: {0}")]
    NotSupported(String),
}

/// Errors related to audio capture and playback
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Already recording (session {0})")]
    AlreadyRecording(String),

    #[error("Recording session {0} has not been stopped yet")]
    SessionNotFinished(String),

    #[error("Failed to start capture command '{command}': {reason}")]
    CaptureSpawn { command: String, reason: String },

    #[error("Failed to stop capture process: {0}")]
    CaptureStop(String),

    #[error("Sound cleanup with '{command}' failed: {reason}")]
    Cleanup { command: String, reason: String },

    #[error("Audio output unavailable: {0}")]
    Output(String),

    #[error("Failed to play '{path}': {reason}")]
    Playback { path: String, reason: String },
}

/// Errors produced by the background dependency gate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("Timed out after {secs:.1}s waiting for dependency '{name}'")]
    DependencyTimeout { name: String, secs: f32 },

    #[error("Dependency loader crashed before '{name}' was ready: {reason}")]
    LoaderCrashed { name: String, reason: String },

    #[error("Dependency '{0}' is not registered with the loader")]
    Unknown(String),

    #[error("Dependency '{name}' does not hold a {expected}")]
    WrongType { name: String, expected: &'static str },
}

/// Errors related to speech-to-text transcription
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("Audio file error: {0}")]
    AudioFile(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Remote server error: {0}")]
    RemoteError(String),

    #[error("Transcription returned no text")]
    EmptyText,
}

/// Errors from the chat completion backend
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("Failed to parse LLM response: {0}")]
    Parse(String),

    #[error("LLM returned an empty answer")]
    EmptyAnswer,
}

/// Errors from speech synthesis backends
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("{0} not found in PATH")]
    NotInstalled(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("No voice model configured for language '{0}'")]
    NoVoiceModel(String),

    #[error("Synthesis command failed: {0}")]
    CommandFailed(String),

    #[error("Speech request failed: {0}")]
    Request(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to clipboard access and paste simulation
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("wl-copy not found in PATH. Install wl-clipboard via your package manager.")]
    WlCopyNotFound,

    #[error("xclip not found in PATH. Install via your package manager.")]
    XclipNotFound,

    #[error("Clipboard access failed: {0}")]
    ClipboardFailed(String),

    #[error("ydotool not found in PATH. Install via your package manager.")]
    YdotoolNotFound,

    #[error("ydotoold daemon not running. Start with: systemctl --user start ydotool")]
    YdotoolNotRunning,

    #[error("xdotool not found in PATH. Install via your package manager.")]
    XdotoolNotFound,

    #[error("Paste keystroke failed: {0}")]
    PasteFailed(String),

    #[error("All paste methods failed. Ensure ydotool or xdotool is available.")]
    AllMethodsFailed,
}

/// Errors that end a single dispatched task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Recording(#[from] AudioError),

    #[error(transparent)]
    Dependency(#[from] GateError),

    #[error("Unknown task letter '{0}'")]
    ChordBindingInvalid(char),

    #[error("Recording too short ({secs:.2}s, minimum {min_secs:.2}s), not transcribing")]
    RecordingTooShort { secs: f32, min_secs: f32 },

    #[error("Clipboard is empty, nothing to transform")]
    EmptyClipboard,

    #[error("{what} is {chars} characters, above the {limit} character limit")]
    ContentTooLarge {
        what: &'static str,
        chars: usize,
        limit: usize,
    },

    #[error("All transcription backends failed: {0}")]
    TranscriptionExhausted(String),

    #[error("All speech backends failed: {0}")]
    SynthesisExhausted(String),

    #[error("Failed to play the spoken answer: {0}")]
    Playback(AudioError),

    #[error("LLM call failed: {0}")]
    Chat(#[from] ChatError),

    #[error("Output failed: {0}")]
    Output(#[from] OutputError),

    #[error("Conversation file error: {0}")]
    Conversation(String),

    #[error("Task worker failed: {0}")]
    Worker(String),
}

impl TaskError {
    /// Failures caused by how the task was triggered rather than by a broken
    /// backend. These are reported but do not count toward the dispatcher's
    /// consecutive failure limit.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TaskError::RecordingTooShort { .. }
                | TaskError::EmptyClipboard
                | TaskError::ContentTooLarge { .. }
                | TaskError::ChordBindingInvalid(_)
        )
    }
}

/// Result type alias using ChordvoxError
pub type Result<T> = std::result::Result<T, ChordvoxError>;

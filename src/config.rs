//! Configuration loading and types for chordvox
//!
//! Configuration is loaded in layers:
//! 1. Built-in defaults
//! 2. Config file (~/.config/chordvox/config.toml)
//! 3. Environment variables (CHORDVOX_*)
//! 4. CLI arguments (highest priority)

use crate::error::ChordvoxError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = r#"# Chordvox Configuration
#
# Location: ~/.config/chordvox/config.toml
# All settings can be overridden via CLI flags

[hotkey]
# Key listener: "evdev" (Linux, kernel level, needs the 'input' group)
# or "rdev" (X11, macOS, Windows)
backend = "evdev"

# Key whose releases form the chord
trigger_key = "LEFTSHIFT"

# Key that aborts a recording without transcribing
cancel_key = "ESC"

# Number of trigger releases needed, and the rolling window they must fit in
chord_count = 3
chord_window_secs = 2.0

# Task letters, pressed right after the chord.
# Parameters ending in "_file" are replaced by the file's contents.
[tasks.w]
task = "write"

[tasks.t]
task = "transform_clipboard"

[tasks.n]
task = "new_voice_chat"

[tasks.c]
task = "continue_voice_chat"

[tasks.v]
toggle = "voice"

# [tasks.e]
# task = "write"
# instruction_file = "~/.config/chordvox/prompts/email.txt"

[recording]
# Capture command, {file} is replaced with the recording path
command = ["rec", "-q", "-r", "44000", "-c", "1", "-b", "16", "{file}"]
min_duration_secs = 2.0
max_duration_secs = 300
# Filter the recording through sox before transcribing (voice band, normalize,
# shorten silences). The raw recording is used when the filter fails.
cleanup = false

[audio.feedback]
enabled = true
volume = 0.7
# start = "~/sounds/Slick.ogg"
# stop = "~/sounds/Rhodes.ogg"
# done = "~/sounds/Positive.ogg"
# error = "~/sounds/Error.ogg"

[transcription]
language = "en"
# prompt = "Dictation on my smartphone: "
# custom_endpoint = "http://192.168.1.100:8080"
default_endpoint = "https://api.openai.com"
model = "whisper-1"
deepgram_model = "nova-2"
# Use Deepgram instead of OpenAI (the custom endpoint is still tried first)
deepgram_only = false

[llm]
endpoint = "https://api.openai.com/v1"
model = "gpt-3.5-turbo-0125"

[speech]
# Speak voice chat answers; the "v" toggle flips this at runtime
enabled = true
# "piper", "openai", "deepgram", "espeak" or "none"
engine = "openai"

[output]
# Press Ctrl+V after filling the clipboard, then put the old content back
auto_paste = false
restore_clipboard = true
"#;

/// Which key event source to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListenerBackend {
    /// Kernel-level events from /dev/input (Linux only)
    #[default]
    Evdev,
    /// Display-server events via rdev
    Rdev,
}

/// Speech synthesis engine for voice chats
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceEngine {
    Piper,
    #[default]
    Openai,
    Deepgram,
    Espeak,
    /// Don't speak answers
    None,
}

impl std::str::FromStr for VoiceEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "piper" => Ok(VoiceEngine::Piper),
            "openai" => Ok(VoiceEngine::Openai),
            "deepgram" => Ok(VoiceEngine::Deepgram),
            "espeak" => Ok(VoiceEngine::Espeak),
            "none" | "off" => Ok(VoiceEngine::None),
            other => Err(format!(
                "unknown voice engine '{}' (piper, openai, deepgram, espeak, none)",
                other
            )),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    /// Task bindings keyed by their letter
    #[serde(default = "default_tasks")]
    pub tasks: BTreeMap<String, BindingSpec>,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub dependencies: DependenciesConfig,
}

/// Chord detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HotkeyConfig {
    #[serde(default)]
    pub backend: ListenerBackend,

    /// Key name (evdev KEY_* constant name, without the KEY_ prefix)
    #[serde(default = "default_trigger_key")]
    pub trigger_key: String,

    /// Key that aborts the current recording
    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,

    /// Trigger releases needed to recognize the chord
    #[serde(default = "default_chord_count")]
    pub chord_count: usize,

    /// Rolling window the releases must fall into
    #[serde(default = "default_chord_window")]
    pub chord_window_secs: f32,
}

/// Raw task binding as written in the config file
///
/// Exactly one of `task` and `toggle` must be set. See
/// [`crate::task::binding`] for resolution.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BindingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggle: Option<String>,

    /// LLM instruction applied to the transcript (write task)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_file: Option<PathBuf>,

    /// Transcription prompt override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_file: Option<PathBuf>,

    /// Transcription language override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Voice engine override for voice chats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_engine: Option<VoiceEngine>,
}

impl BindingSpec {
    fn task(kind: &str) -> Self {
        Self {
            task: Some(kind.to_string()),
            ..Default::default()
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Capture command and arguments; `{file}` is replaced with the output path
    #[serde(default = "default_capture_command")]
    pub command: Vec<String>,

    /// Recordings shorter than this are discarded without transcription
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: f32,

    /// Safety limit, the recording stops on its own after this long
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,

    /// Delay between launching the capture and playing the start cue
    #[serde(default = "default_start_delay")]
    pub start_delay_ms: u64,

    /// Run the cleanup command on the recording before transcription
    #[serde(default)]
    pub cleanup: bool,

    /// Cleanup command; `{input}` and `{output}` are replaced with WAV paths
    #[serde(default = "default_cleanup_command")]
    pub cleanup_command: Vec<String>,
}

/// Audio output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub feedback: AudioFeedbackConfig,
}

/// Audio feedback configuration for sound cues
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioFeedbackConfig {
    /// Enable audio feedback sounds
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Volume level (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Sound played when recording starts
    #[serde(default)]
    pub start: Option<PathBuf>,
    /// Sound played when recording stops
    #[serde(default)]
    pub stop: Option<PathBuf>,
    /// Sound played when a task finished
    #[serde(default)]
    pub done: Option<PathBuf>,
    /// Sound played when a task failed or was cancelled
    #[serde(default)]
    pub error: Option<PathBuf>,
}

/// Transcription fallback chain configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptionConfig {
    /// Language code (en, fr, ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Prompt passed to whisper to bias spelling and style
    #[serde(default)]
    pub prompt: Option<String>,

    /// Optional self-hosted OpenAI-compatible server, tried first
    #[serde(default)]
    pub custom_endpoint: Option<String>,

    /// API key for the custom endpoint
    #[serde(default)]
    pub custom_api_key: Option<String>,

    /// Default OpenAI-compatible backend
    #[serde(default = "default_openai_endpoint")]
    pub default_endpoint: String,

    /// Model name sent to the OpenAI-compatible backends
    #[serde(default = "default_whisper_model")]
    pub model: String,

    /// Deepgram model name
    #[serde(default = "default_deepgram_model")]
    pub deepgram_model: String,

    /// Use deepgram in place of the default backend
    #[serde(default)]
    pub deepgram_only: bool,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

/// Chat completion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (".../v1")
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// System prompt for spoken conversations
    #[serde(default = "default_voice_prompt")]
    pub voice_system_prompt: String,

    /// System prompt for clipboard transformation
    #[serde(default = "default_transform_prompt")]
    pub transform_system_prompt: String,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    /// Initial state of the voice toggle
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub engine: VoiceEngine,

    /// Piper voice model per language code
    #[serde(default = "default_piper_models")]
    pub piper_models: BTreeMap<String, String>,

    #[serde(default = "default_openai_voice")]
    pub openai_voice: String,

    #[serde(default = "default_openai_tts_model")]
    pub openai_model: String,

    #[serde(default = "default_deepgram_voice")]
    pub deepgram_voice: String,

    #[serde(default = "default_espeak_pitch")]
    pub espeak_pitch: u32,

    #[serde(default = "default_espeak_speed")]
    pub espeak_speed: u32,
}

/// Clipboard and paste configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Simulate Ctrl+V after filling the clipboard
    #[serde(default)]
    pub auto_paste: bool,

    /// Put the previous clipboard content back after pasting
    #[serde(default = "default_true")]
    pub restore_clipboard: bool,

    /// Delay between setting the clipboard and pressing Ctrl+V
    #[serde(default = "default_paste_delay")]
    pub paste_delay_ms: u64,
}

/// Conversation history configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConversationConfig {
    /// Directory holding conversation files (defaults to the data directory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Background loader configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependenciesConfig {
    /// How long a task waits for a backend to finish loading
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: f32,

    /// Directory searched for `<NAME>_API_KEY.txt` files (defaults to the config directory)
    #[serde(default)]
    pub api_key_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_trigger_key() -> String {
    "LEFTSHIFT".to_string()
}

fn default_cancel_key() -> String {
    "ESC".to_string()
}

fn default_chord_count() -> usize {
    3
}

fn default_chord_window() -> f32 {
    2.0
}

fn default_tasks() -> BTreeMap<String, BindingSpec> {
    let mut tasks = BTreeMap::new();
    tasks.insert("w".to_string(), BindingSpec::task("write"));
    tasks.insert("t".to_string(), BindingSpec::task("transform_clipboard"));
    tasks.insert("n".to_string(), BindingSpec::task("new_voice_chat"));
    tasks.insert("c".to_string(), BindingSpec::task("continue_voice_chat"));
    tasks.insert(
        "v".to_string(),
        BindingSpec {
            toggle: Some("voice".to_string()),
            ..Default::default()
        },
    );
    tasks
}

fn default_capture_command() -> Vec<String> {
    ["rec", "-q", "-r", "44000", "-c", "1", "-b", "16", "{file}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cleanup_command() -> Vec<String> {
    let mut command: Vec<String> = ["sox", "{input}", "{output}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    command.extend(crate::recording::CLEANUP_EFFECTS.iter().map(|s| s.to_string()));
    command
}

fn default_min_duration() -> f32 {
    2.0
}

fn default_max_duration() -> u32 {
    300
}

fn default_start_delay() -> u64 {
    200
}

fn default_volume() -> f32 {
    0.7
}

fn default_language() -> String {
    "en".to_string()
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_whisper_model() -> String {
    "whisper-1".to_string()
}

fn default_deepgram_model() -> String {
    "nova-2".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-3.5-turbo-0125".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_voice_prompt() -> String {
    "You are a helpful assistant. I am in a hurry and your answers will be played on speaker \
     so use as few words as you can while remaining helpful and truthful. Don't use too short \
     sentences otherwise the speakers will crash."
        .to_string()
}

fn default_transform_prompt() -> String {
    "You transform INPUT_TEXT according to an instruction. Only reply the transformed text \
     without anything else."
        .to_string()
}

fn default_piper_models() -> BTreeMap<String, String> {
    let mut models = BTreeMap::new();
    models.insert("fr".to_string(), "fr_FR-gilles-low".to_string());
    models.insert("en".to_string(), "en_US-lessac-medium".to_string());
    models
}

fn default_openai_voice() -> String {
    "echo".to_string()
}

fn default_openai_tts_model() -> String {
    "tts-1".to_string()
}

fn default_deepgram_voice() -> String {
    "aura-asteria-en".to_string()
}

fn default_espeak_pitch() -> u32 {
    20
}

fn default_espeak_speed() -> u32 {
    110
}

fn default_paste_delay() -> u64 {
    100
}

fn default_wait_timeout() -> f32 {
    30.0
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            backend: ListenerBackend::default(),
            trigger_key: default_trigger_key(),
            cancel_key: default_cancel_key(),
            chord_count: default_chord_count(),
            chord_window_secs: default_chord_window(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            command: default_capture_command(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            start_delay_ms: default_start_delay(),
            cleanup: false,
            cleanup_command: default_cleanup_command(),
        }
    }
}

impl Default for AudioFeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: default_volume(),
            start: None,
            stop: None,
            done: None,
            error: None,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            prompt: None,
            custom_endpoint: None,
            custom_api_key: None,
            default_endpoint: default_openai_endpoint(),
            model: default_whisper_model(),
            deepgram_model: default_deepgram_model(),
            deepgram_only: false,
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            voice_system_prompt: default_voice_prompt(),
            transform_system_prompt: default_transform_prompt(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: VoiceEngine::default(),
            piper_models: default_piper_models(),
            openai_voice: default_openai_voice(),
            openai_model: default_openai_tts_model(),
            deepgram_voice: default_deepgram_voice(),
            espeak_pitch: default_espeak_pitch(),
            espeak_speed: default_espeak_speed(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            auto_paste: false,
            restore_clipboard: true,
            paste_delay_ms: default_paste_delay(),
        }
    }
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: default_wait_timeout(),
            api_key_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hotkey: HotkeyConfig::default(),
            tasks: default_tasks(),
            recording: RecordingConfig::default(),
            audio: AudioConfig::default(),
            transcription: TranscriptionConfig::default(),
            llm: LlmConfig::default(),
            speech: SpeechConfig::default(),
            output: OutputConfig::default(),
            conversation: ConversationConfig::default(),
            dependencies: DependenciesConfig::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chordvox")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "chordvox")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the data directory path (conversations, activity log)
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "chordvox")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Directory holding conversation files
    pub fn conversation_dir(&self) -> PathBuf {
        self.conversation
            .dir
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| Self::data_dir().join("conversations"))
    }

    /// Directory searched for `<NAME>_API_KEY.txt` files
    pub fn api_key_dir(&self) -> PathBuf {
        self.dependencies
            .api_key_dir
            .as_deref()
            .map(expand_home)
            .or_else(Self::config_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Path of the plain-text activity log
    pub fn activity_log_path() -> PathBuf {
        Self::data_dir().join("texts.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(config_dir) = Self::config_dir() {
            std::fs::create_dir_all(&config_dir)?;
            tracing::debug!("Ensured config directory exists: {:?}", config_dir);
        }

        let conversation_dir = self.conversation_dir();
        std::fs::create_dir_all(&conversation_dir)?;
        tracing::debug!("Ensured conversation directory exists: {:?}", conversation_dir);

        Ok(())
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    path.to_path_buf()
}

/// Parse configuration from TOML text
pub fn parse_config(contents: &str) -> Result<Config, ChordvoxError> {
    let config: Config = toml::from_str(contents)
        .map_err(|e| ChordvoxError::Config(format!("Invalid config: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ChordvoxError> {
    if config.hotkey.chord_count == 0 {
        return Err(ChordvoxError::Config(
            "hotkey.chord_count must be at least 1".into(),
        ));
    }
    let window = config.hotkey.chord_window_secs;
    if !(window.is_finite() && window > 0.0) {
        return Err(ChordvoxError::Config(
            "hotkey.chord_window_secs must be a finite number greater than 0".into(),
        ));
    }
    ensure_finite_secs(
        "recording.min_duration_secs",
        config.recording.min_duration_secs,
    )?;
    ensure_finite_secs(
        "dependencies.wait_timeout_secs",
        config.dependencies.wait_timeout_secs,
    )?;
    if !config.recording.command.iter().any(|arg| arg.contains("{file}")) {
        return Err(ChordvoxError::Config(
            "recording.command must contain a {file} placeholder".into(),
        ));
    }
    if config.recording.cleanup {
        for placeholder in ["{input}", "{output}"] {
            if !config
                .recording
                .cleanup_command
                .iter()
                .any(|arg| arg.contains(placeholder))
            {
                return Err(ChordvoxError::Config(format!(
                    "recording.cleanup_command must contain an {} placeholder",
                    placeholder
                )));
            }
        }
    }
    Ok(())
}

/// Durations in seconds must be finite and not negative
fn ensure_finite_secs(field: &str, secs: f32) -> Result<(), ChordvoxError> {
    if !(secs.is_finite() && secs >= 0.0) {
        return Err(ChordvoxError::Config(format!(
            "{} must be a finite number of seconds, got {}",
            field, secs
        )));
    }
    Ok(())
}

/// Load configuration from file, with defaults for missing values
pub fn load_config(path: Option<&Path>) -> Result<Config, ChordvoxError> {
    let mut config = Config::default();

    let config_path = path.map(PathBuf::from).or_else(Config::default_path);

    if let Some(ref path) = config_path {
        if path.exists() {
            tracing::debug!("Loading config from {:?}", path);
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ChordvoxError::Config(format!("Failed to read config: {}", e)))?;
            config = parse_config(&contents)?;
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
        }
    }

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    Ok(config)
}

/// Override fields from CHORDVOX_* environment variables
fn apply_env_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ChordvoxError> {
    if let Some(key) = var("CHORDVOX_TRIGGER_KEY") {
        config.hotkey.trigger_key = key;
    }
    if let Some(lang) = var("CHORDVOX_LANGUAGE") {
        config.transcription.language = lang;
    }
    if let Some(engine) = var("CHORDVOX_VOICE_ENGINE") {
        config.speech.engine = engine.parse().map_err(ChordvoxError::Config)?;
    }
    if let Some(endpoint) = var("CHORDVOX_CUSTOM_ENDPOINT") {
        config.transcription.custom_endpoint = Some(endpoint);
    }
    if let Some(model) = var("CHORDVOX_LLM_MODEL") {
        config.llm.model = model;
    }
    Ok(())
}

/// Save configuration to file
pub fn save_config(config: &Config, path: &Path) -> Result<(), ChordvoxError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ChordvoxError::Config(format!("Failed to create config dir: {}", e)))?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| ChordvoxError::Config(format!("Failed to serialize config: {}", e)))?;

    std::fs::write(path, contents)
        .map_err(|e| ChordvoxError::Config(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.hotkey.trigger_key, "LEFTSHIFT");
        assert_eq!(config.hotkey.chord_count, 3);
        assert_eq!(config.recording.min_duration_secs, 2.0);
        assert_eq!(config.speech.engine, VoiceEngine::Openai);
        assert!(!config.output.auto_paste);
        assert_eq!(config.tasks.len(), 5);
        assert_eq!(config.tasks["v"].toggle.as_deref(), Some("voice"));
    }

    #[test]
    fn test_default_config_text_parses() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.hotkey.cancel_key, "ESC");
        assert_eq!(config.tasks["w"].task.as_deref(), Some("write"));
        assert_eq!(config.transcription.model, "whisper-1");
        assert!(config.audio.feedback.enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            [hotkey]
            trigger_key = "RIGHTCTRL"
            chord_count = 4
            chord_window_secs = 4.0

            [tasks.w]
            task = "write"
            instruction = "Fix the grammar"

            [speech]
            engine = "piper"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.hotkey.trigger_key, "RIGHTCTRL");
        assert_eq!(config.hotkey.chord_count, 4);
        assert_eq!(config.hotkey.backend, ListenerBackend::Evdev);
        // An explicit [tasks] table replaces the defaults
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(
            config.tasks["w"].instruction.as_deref(),
            Some("Fix the grammar")
        );
        assert_eq!(config.speech.engine, VoiceEngine::Piper);
        assert_eq!(config.speech.piper_models["fr"], "fr_FR-gilles-low");
    }

    #[test]
    fn test_rejects_zero_chord_count() {
        let err = parse_config("[hotkey]\nchord_count = 0\n").unwrap_err();
        assert!(err.to_string().contains("chord_count"));
    }

    #[test]
    fn test_rejects_nonpositive_window() {
        let err = parse_config("[hotkey]\nchord_window_secs = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("chord_window_secs"));
    }

    #[test]
    fn test_rejects_infinite_durations() {
        let err = parse_config("[hotkey]\nchord_window_secs = inf\n").unwrap_err();
        assert!(err.to_string().contains("chord_window_secs"));

        let err = parse_config("[recording]\nmin_duration_secs = inf\n").unwrap_err();
        assert!(err.to_string().contains("min_duration_secs"));

        let err = parse_config("[dependencies]\nwait_timeout_secs = nan\n").unwrap_err();
        assert!(err.to_string().contains("wait_timeout_secs"));
    }

    #[test]
    fn test_cleanup_defaults_to_sox() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert!(!config.recording.cleanup);
        assert_eq!(config.recording.cleanup_command[0], "sox");
        assert!(config
            .recording
            .cleanup_command
            .contains(&"norm".to_string()));
    }

    #[test]
    fn test_rejects_cleanup_command_without_output() {
        let err = parse_config(
            "[recording]\ncleanup = true\ncleanup_command = [\"sox\", \"{input}\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("{output}"));
    }

    #[test]
    fn test_rejects_capture_command_without_placeholder() {
        let err = parse_config("[recording]\ncommand = [\"rec\", \"out.wav\"]\n").unwrap_err();
        assert!(err.to_string().contains("{file}"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |name| match name {
            "CHORDVOX_VOICE_ENGINE" => Some("espeak".to_string()),
            "CHORDVOX_LANGUAGE" => Some("fr".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.speech.engine, VoiceEngine::Espeak);
        assert_eq!(config.transcription.language, "fr");
    }

    #[test]
    fn test_env_override_rejects_unknown_engine() {
        let mut config = Config::default();
        let result = apply_env_overrides(&mut config, |name| {
            (name == "CHORDVOX_VOICE_ENGINE").then(|| "festival".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.hotkey.chord_count = 5;
        save_config(&config, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.hotkey.chord_count, 5);
        assert_eq!(loaded.tasks.len(), config.tasks.len());
    }
}

//! Process-wide services shared by the dispatcher and task runs
//!
//! Everything a task touches lives in one [`AppContext`], built once at
//! startup. The only state that changes at runtime is in [`RuntimeFlags`].

use crate::activity::ActivityLog;
use crate::audio::feedback::SoundCue;
use crate::audio::{PlayerFactory, RodioPlayer};
use crate::config::Config;
use crate::conversation::{ConversationStore, FileConversationStore};
use crate::credentials::{self, ApiKeys};
use crate::gate::{DependencyGate, DependencySpec, Resolved};
use crate::llm::{ChatCompleter, OpenAiChat};
use crate::notification::{DesktopNotifier, Notifier};
use crate::output::clipboard::SystemClipboard;
use crate::output::{Clipboard, PasteChain, PasteKeys};
use crate::recording::{CommandCapture, RecordingController};
use crate::speech::SpeechBackends;
use crate::transcribe::TranscriptionChain;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Names of the background-loaded dependencies
pub const CREDENTIALS: &str = "credentials";
pub const TRANSCRIPTION: &str = "transcription";
pub const CHAT: &str = "chat";
pub const SPEECH: &str = "speech";

/// Chat backend as stored in the dependency gate
pub type ChatBackend = Arc<dyn ChatCompleter>;

/// Flags flipped by toggle bindings
#[derive(Debug)]
pub struct RuntimeFlags {
    voice_enabled: AtomicBool,
}

impl RuntimeFlags {
    pub fn new(voice_enabled: bool) -> Self {
        Self {
            voice_enabled: AtomicBool::new(voice_enabled),
        }
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::SeqCst)
    }

    /// Flip the voice flag and return the new value
    pub fn toggle_voice(&self) -> bool {
        !self.voice_enabled.fetch_xor(true, Ordering::SeqCst)
    }
}

pub struct AppContext {
    pub config: Config,
    pub flags: RuntimeFlags,
    pub gate: Arc<DependencyGate>,
    pub cue: SoundCue,
    pub recorder: RecordingController,
    pub notifier: Arc<dyn Notifier>,
    pub clipboard: Arc<dyn Clipboard>,
    pub paste: Arc<dyn PasteKeys>,
    pub conversations: Arc<dyn ConversationStore>,
    pub players: PlayerFactory,
    pub activity: ActivityLog,
}

impl AppContext {
    /// Build the production context and start loading dependencies
    pub fn from_config(config: Config) -> std::io::Result<Self> {
        let gate = DependencyGate::spawn(default_dependencies(&config))?;
        let players = RodioPlayer::factory(config.audio.feedback.volume);

        Ok(Self {
            flags: RuntimeFlags::new(config.speech.enabled),
            gate: Arc::new(gate),
            cue: SoundCue::new(&config.audio.feedback, players.clone()),
            recorder: RecordingController::new(Box::new(CommandCapture::new(
                config.recording.command.clone(),
            ))),
            notifier: Arc::new(DesktopNotifier),
            clipboard: Arc::new(SystemClipboard::detect()),
            paste: Arc::new(PasteChain::system()),
            conversations: Arc::new(FileConversationStore::new(config.conversation_dir())),
            players,
            activity: ActivityLog::new(Some(Config::activity_log_path())),
            config,
        })
    }

    /// How long a task waits on the dependency gate
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.config.dependencies.wait_timeout_secs.max(0.0))
    }
}

/// Loader list for the production backends
///
/// Credentials load first; every later dependency builds from them.
pub fn default_dependencies(config: &Config) -> Vec<DependencySpec> {
    let key_dir = config.api_key_dir();
    let transcription = config.transcription.clone();
    let llm = config.llm.clone();
    let speech = config.speech.clone();

    vec![
        DependencySpec::new(CREDENTIALS, move |_: &Resolved<'_>| {
            Ok(ApiKeys::load(&key_dir))
        }),
        DependencySpec::new(TRANSCRIPTION, move |resolved: &Resolved<'_>| {
            let keys = resolved
                .get::<ApiKeys>(CREDENTIALS)
                .ok_or_else(|| "credentials not loaded".to_string())?;
            Ok(TranscriptionChain::from_config(&transcription, &keys))
        }),
        DependencySpec::new(CHAT, move |resolved: &Resolved<'_>| {
            let keys = resolved
                .get::<ApiKeys>(CREDENTIALS)
                .ok_or_else(|| "credentials not loaded".to_string())?;
            let chat: ChatBackend = Arc::new(OpenAiChat::new(
                &llm.endpoint,
                keys.get(credentials::OPENAI).map(str::to_string),
                Duration::from_secs(llm.timeout_secs),
            ));
            Ok(chat)
        }),
        DependencySpec::new(SPEECH, move |resolved: &Resolved<'_>| {
            let keys = resolved
                .get::<ApiKeys>(CREDENTIALS)
                .ok_or_else(|| "credentials not loaded".to_string())?;
            Ok(SpeechBackends::from_config(&speech, &keys))
        }),
    ]
}

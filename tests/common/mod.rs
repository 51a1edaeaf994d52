//! In-memory collaborators for driving tasks and the dispatcher without
//! microphones, network access or a desktop session.

#![allow(dead_code)]

use chordvox::activity::ActivityLog;
use chordvox::audio::feedback::SoundCue;
use chordvox::audio::{PlayerFactory, SoundPlayer, SoundSource};
use chordvox::config::{Config, VoiceEngine};
use chordvox::context::{AppContext, ChatBackend, RuntimeFlags, CHAT, SPEECH, TRANSCRIPTION};
use chordvox::conversation::FileConversationStore;
use chordvox::error::{
    AudioError, ChatError, HotkeyError, OutputError, SpeechError, TranscribeError,
};
use chordvox::fallback::FallbackChain;
use chordvox::gate::{DependencyGate, DependencySpec, Resolved};
use chordvox::hotkey::{KeyListener, KeyRelease};
use chordvox::llm::{ChatCompleter, ChatMessage};
use chordvox::notification::Notifier;
use chordvox::output::{Clipboard, PasteKeys};
use chordvox::recording::{CaptureBackend, CaptureHandle, RecordingController};
use chordvox::speech::{SpeechBackends, SpeechSynthesizer};
use chordvox::transcribe::{TranscriptionChain, Transcriber};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Counts capture starts and stops
#[derive(Default)]
pub struct CaptureLog {
    pub spawned: AtomicUsize,
    pub terminated: AtomicUsize,
    /// Threads the captures were stopped on
    pub stop_threads: Mutex<Vec<std::thread::ThreadId>>,
}

struct FakeCapture {
    log: Arc<CaptureLog>,
}

impl CaptureBackend for FakeCapture {
    fn spawn(&self, path: &Path) -> Result<Box<dyn CaptureHandle>, AudioError> {
        std::fs::write(path, b"RIFF").map_err(|e| AudioError::CaptureSpawn {
            command: "fake".into(),
            reason: e.to_string(),
        })?;
        self.log.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            log: self.log.clone(),
        }))
    }
}

struct FakeHandle {
    log: Arc<CaptureLog>,
}

impl CaptureHandle for FakeHandle {
    fn terminate(&mut self) -> Result<(), AudioError> {
        self.log.terminated.fetch_add(1, Ordering::SeqCst);
        self.log
            .stop_threads
            .lock()
            .unwrap()
            .push(std::thread::current().id());
        Ok(())
    }
}

pub struct FakeTranscriber {
    result: Result<String, String>,
    pub calls: AtomicUsize,
    pub languages: Mutex<Vec<String>>,
    pub files: Mutex<Vec<PathBuf>>,
}

impl FakeTranscriber {
    fn with_result(result: Result<String, String>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: AtomicUsize::new(0),
            languages: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(text: &str) -> Arc<Self> {
        Self::with_result(Ok(text.to_string()))
    }

    pub fn failing(reason: &str) -> Arc<Self> {
        Self::with_result(Err(reason.to_string()))
    }

    pub fn last_file(&self) -> Option<PathBuf> {
        self.files.lock().unwrap().last().cloned()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for FakeTranscriber {
    fn transcribe(
        &self,
        audio: &Path,
        language: &str,
        _prompt: Option<&str>,
    ) -> Result<String, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push(audio.to_path_buf());
        self.languages.lock().unwrap().push(language.to_string());
        self.result
            .clone()
            .map_err(TranscribeError::RemoteError)
    }
}

pub struct FakeChat {
    answer: String,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    pub fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Vec<ChatMessage> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl ChatCompleter for FakeChat {
    fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        Ok(self.answer.clone())
    }
}

pub struct FakeSpeech {
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

impl SpeechSynthesizer for FakeSpeech {
    fn synthesize(&self, _text: &str, _language: &str, out: &Path) -> Result<(), SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SpeechError::Request("speech service offline".into()));
        }
        std::fs::write(out, b"ID3")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
}

impl MemoryClipboard {
    pub fn with_text(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: Mutex::new(text.to_string()),
        })
    }

    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Clipboard for MemoryClipboard {
    async fn read(&self) -> Result<String, OutputError> {
        Ok(self.text())
    }

    async fn write(&self, text: &str) -> Result<(), OutputError> {
        *self.text.lock().unwrap() = text.to_string();
        Ok(())
    }
}

struct NoPaste;

#[async_trait::async_trait]
impl PasteKeys for NoPaste {
    async fn paste(&self) -> Result<(), OutputError> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages()
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, _timeout: Duration) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Counts finished plays; fails the first `failures` plays
struct CountingPlayer {
    played: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl SoundPlayer for CountingPlayer {
    fn play(&mut self, source: &SoundSource) -> Result<(), AudioError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AudioError::Playback {
                path: source.describe(),
                reason: "device busy".into(),
            });
        }
        self.played.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Config with no delays, no cue sounds and a short gate timeout
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.recording.min_duration_secs = 0.0;
    config.recording.start_delay_ms = 0;
    config.audio.feedback.enabled = false;
    config.dependencies.wait_timeout_secs = 2.0;
    config.output.auto_paste = false;
    config.speech.engine = VoiceEngine::Openai;
    config
}

/// Everything a test can inspect after a run
pub struct Harness {
    pub ctx: Arc<AppContext>,
    pub capture: Arc<CaptureLog>,
    pub chat: Arc<FakeChat>,
    pub speech: Arc<FakeSpeech>,
    pub clipboard: Arc<MemoryClipboard>,
    pub notifier: Arc<RecordingNotifier>,
    pub played: Arc<AtomicUsize>,
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    pub config: Config,
    pub transcribers: Vec<(&'static str, Arc<FakeTranscriber>)>,
    pub chat: Arc<FakeChat>,
    pub speech: Arc<FakeSpeech>,
    /// Registered as the espeak engine when set
    pub espeak: Option<Arc<FakeSpeech>>,
    pub clipboard: Arc<MemoryClipboard>,
    pub voice_enabled: bool,
    /// Number of plays that fail before playback works
    pub failing_plays: usize,
    /// Extra time the transcription dependency takes to load
    pub transcription_load_delay: Duration,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: test_config(),
            transcribers: vec![("primary", FakeTranscriber::ok("hello world"))],
            chat: FakeChat::new("Sure thing."),
            speech: FakeSpeech::working(),
            espeak: None,
            clipboard: Arc::new(MemoryClipboard::default()),
            voice_enabled: false,
            failing_plays: 0,
            transcription_load_delay: Duration::ZERO,
        }
    }
}

impl HarnessBuilder {
    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let capture = Arc::new(CaptureLog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let played = Arc::new(AtomicUsize::new(0));

        let counter = played.clone();
        let failures = Arc::new(AtomicUsize::new(self.failing_plays));
        let players: PlayerFactory = Arc::new(move || {
            Ok(Box::new(CountingPlayer {
                played: counter.clone(),
                failures: failures.clone(),
            }) as Box<dyn SoundPlayer>)
        });

        let mut chain = FallbackChain::<dyn Transcriber>::new("transcription");
        for (name, transcriber) in &self.transcribers {
            chain.push(*name, transcriber.clone() as Arc<dyn Transcriber>);
        }
        let transcription = TranscriptionChain::new(chain);
        let delay = self.transcription_load_delay;
        let chat: ChatBackend = self.chat.clone();
        let mut speech = SpeechBackends::new().with(VoiceEngine::Openai, self.speech.clone());
        if let Some(ref espeak) = self.espeak {
            speech = speech.with(VoiceEngine::Espeak, espeak.clone());
        }

        let specs = vec![
            DependencySpec::new(TRANSCRIPTION, move |_: &Resolved<'_>| {
                std::thread::sleep(delay);
                Ok(transcription)
            }),
            DependencySpec::new(CHAT, move |_: &Resolved<'_>| Ok(chat)),
            DependencySpec::new(SPEECH, move |_: &Resolved<'_>| Ok(speech)),
        ];

        let config = self.config;
        let ctx = AppContext {
            flags: RuntimeFlags::new(self.voice_enabled),
            gate: Arc::new(DependencyGate::spawn(specs).unwrap()),
            cue: SoundCue::new(&config.audio.feedback, players.clone()),
            recorder: RecordingController::new(Box::new(FakeCapture {
                log: capture.clone(),
            })),
            notifier: notifier.clone(),
            clipboard: self.clipboard.clone(),
            paste: Arc::new(NoPaste),
            conversations: Arc::new(FileConversationStore::new(dir.path().join("conversations"))),
            players,
            activity: ActivityLog::new(Some(dir.path().join("texts.log"))),
            config,
        };

        Harness {
            ctx: Arc::new(ctx),
            capture,
            chat: self.chat,
            speech: self.speech,
            clipboard: self.clipboard,
            notifier,
            played,
            dir,
        }
    }
}

impl Harness {
    pub fn conversation_dir(&self) -> PathBuf {
        self.dir.path().join("conversations")
    }

    pub fn conversation_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.conversation_dir()) {
            Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn activity_log(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("texts.log")).unwrap_or_default()
    }
}

/// Listener fed by the test through the returned sender
pub struct ChannelListener {
    rx: Option<mpsc::Receiver<KeyRelease>>,
}

#[async_trait::async_trait]
impl KeyListener for ChannelListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyRelease>, HotkeyError> {
        self.rx
            .take()
            .ok_or_else(|| HotkeyError::ListenerStopped("already started".into()))
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        Ok(())
    }
}

pub fn channel_listener() -> (mpsc::Sender<KeyRelease>, ChannelListener) {
    let (tx, rx) = mpsc::channel(32);
    (tx, ChannelListener { rx: Some(rx) })
}

pub fn release(key: &str) -> KeyRelease {
    KeyRelease::new(key, Instant::now())
}

/// Poll `condition` until it holds, failing the test after 5 seconds
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {}", what);
}

//! Task execution
//!
//! A task records the user, transcribes the recording and acts on the
//! transcript:
//!
//! - `write`: put the transcript (or the LLM's rewrite of it) on the clipboard
//! - `transform_clipboard`: apply the spoken instruction to the clipboard
//! - `new_voice_chat` / `continue_voice_chat`: ask the LLM, speak the answer
//!   and append the exchange to the conversation file
//!
//! Recording ends on [`StopSignal::Finish`] (trigger key), on
//! [`StopSignal::Cancel`] (cancel key), or when the maximum duration is
//! reached.

pub mod binding;

use crate::audio::feedback::SoundEvent;
use crate::audio::play_to_end;
use crate::config::VoiceEngine;
use crate::context::{AppContext, ChatBackend, CHAT, SPEECH, TRANSCRIPTION};
use crate::conversation::Conversation;
use crate::error::TaskError;
use crate::llm::{ChatMessage, Role};
use crate::notification;
use crate::output;
use crate::recording::{cleanup_recording, ensure_min_duration, RecordingSession};
use crate::speech::{engine_name, SpeechBackends};
use crate::transcribe::TranscriptionChain;
use binding::{TaskKind, TaskParams};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::sync::oneshot;

/// Largest clipboard or transcript sent to the LLM, in characters
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// How the user ended a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// Keep the recording and carry on with the task
    Finish,
    /// Throw the recording away
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Cancelled,
}

/// A task to run, with its binding's overrides
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub params: TaskParams,
}

impl TaskRequest {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            kind,
            params: TaskParams::default(),
        }
    }
}

/// Runs tasks end to end against the shared context
#[derive(Clone)]
pub struct TaskRunner {
    ctx: Arc<AppContext>,
}

impl TaskRunner {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Run one task
    ///
    /// Errors are returned, not notified; the caller decides how to report
    /// them. The recording is always stopped before this returns.
    pub async fn run(
        &self,
        request: &TaskRequest,
        stop: oneshot::Receiver<StopSignal>,
    ) -> Result<TaskOutcome, TaskError> {
        tracing::info!("Running task {}", request.kind);

        let result = self.execute(request, stop).await;
        match &result {
            Ok(TaskOutcome::Completed) => {
                self.ctx.cue.cue(SoundEvent::Done);
                self.ctx
                    .activity
                    .record(&format!("Task {} done", request.kind));
                tracing::info!("Task {} done", request.kind);
            }
            Ok(TaskOutcome::Cancelled) => {
                self.ctx.cue.cue(SoundEvent::Error);
                tracing::info!("Task {} cancelled", request.kind);
            }
            Err(e) => {
                self.ctx.cue.cue(SoundEvent::Error);
                tracing::error!("Task {} failed: {}", request.kind, e);
            }
        }

        if let Some(e) = self.ctx.cue.check_last_error() {
            tracing::warn!("Feedback sound failed: {}", e);
        }
        result
    }

    async fn execute(
        &self,
        request: &TaskRequest,
        stop: oneshot::Receiver<StopSignal>,
    ) -> Result<TaskOutcome, TaskError> {
        // Checked before recording so a useless recording is never made
        let clipboard = if request.kind == TaskKind::TransformClipboard {
            let text = self.ctx.clipboard.read().await?;
            if text.trim().is_empty() {
                return Err(TaskError::EmptyClipboard);
            }
            ensure_size("Clipboard", &text)?;
            Some(text)
        } else {
            None
        };

        let Some(transcript) = self.record_and_transcribe(&request.params, stop).await? else {
            return Ok(TaskOutcome::Cancelled);
        };

        match request.kind {
            TaskKind::Write => self.write(&request.params, &transcript).await?,
            TaskKind::TransformClipboard => {
                let clipboard = clipboard.unwrap_or_default();
                self.transform(&clipboard, &transcript).await?
            }
            TaskKind::NewVoiceChat | TaskKind::ContinueVoiceChat => {
                self.voice_chat(request.kind, &request.params, &transcript)
                    .await?
            }
        }

        Ok(TaskOutcome::Completed)
    }

    /// Record until stopped; `None` when the user cancelled
    async fn record(
        &self,
        stop: oneshot::Receiver<StopSignal>,
    ) -> Result<Option<RecordingSession>, TaskError> {
        let config = &self.ctx.config.recording;
        let id = uuid::Uuid::new_v4().to_string();
        let mut session = self.ctx.recorder.start(&id)?;

        // Give the capture command time to open the device
        tokio::time::sleep(Duration::from_millis(config.start_delay_ms)).await;
        self.ctx.cue.cue(SoundEvent::RecordingStart);

        let max_duration = Duration::from_secs(u64::from(config.max_duration_secs));
        let signal = tokio::select! {
            // A dropped sender means nobody can finish the recording anymore
            received = stop => received.unwrap_or(StopSignal::Cancel),
            _ = tokio::time::sleep(max_duration) => {
                tracing::warn!(
                    "Recording timeout ({}s limit), stopping",
                    config.max_duration_secs
                );
                StopSignal::Finish
            }
        };

        // Stopping waits for the capture process to exit
        let ctx = self.ctx.clone();
        let (session, stopped) = tokio::task::spawn_blocking(move || {
            let stopped = ctx.recorder.stop(&mut session);
            (session, stopped)
        })
        .await
        .map_err(|e| TaskError::Worker(e.to_string()))?;
        stopped?;
        self.ctx.cue.cue(SoundEvent::RecordingStop);

        if signal == StopSignal::Cancel {
            tracing::info!("Recording cancelled");
            self.ctx
                .notifier
                .notify("Recording cancelled", notification::SHORT)
                .await;
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn record_and_transcribe(
        &self,
        params: &TaskParams,
        stop: oneshot::Receiver<StopSignal>,
    ) -> Result<Option<String>, TaskError> {
        let Some(session) = self.record(stop).await? else {
            return Ok(None);
        };

        let duration = self.ctx.recorder.duration(&session)?;
        ensure_min_duration(duration, self.ctx.config.recording.min_duration_secs)?;

        let chain = self
            .ctx
            .gate
            .get::<TranscriptionChain>(TRANSCRIPTION, self.ctx.wait_timeout())
            .await?;

        let transcription = &self.ctx.config.transcription;
        let language = params
            .language
            .clone()
            .unwrap_or_else(|| transcription.language.clone());
        let prompt = params.prompt.clone().or_else(|| transcription.prompt.clone());

        let cleaned = if self.ctx.config.recording.cleanup {
            self.clean_up(session.path()).await
        } else {
            None
        };
        let path = match cleaned {
            Some(ref cleaned) => cleaned.to_path_buf(),
            None => session.path().to_path_buf(),
        };

        let transcript = tokio::task::spawn_blocking(move || {
            chain.transcribe(&path, &language, prompt.as_deref())
        })
        .await
        .map_err(|e| TaskError::Worker(e.to_string()))??;
        // The recording files live until here
        drop(cleaned);
        drop(session);

        tracing::info!("Transcript: {:?}", transcript);
        self.ctx
            .activity
            .record(&format!("Transcript: {}", transcript));
        self.ctx
            .notifier
            .notify(&transcript, notification::LONG)
            .await;

        Ok(Some(transcript))
    }

    /// Filter the recording; `None` means transcribe the raw file
    async fn clean_up(&self, recording: &Path) -> Option<TempPath> {
        let command = self.ctx.config.recording.cleanup_command.clone();
        let input = recording.to_path_buf();

        match tokio::task::spawn_blocking(move || cleanup_recording(&command, &input)).await {
            Ok(Ok(cleaned)) => Some(cleaned),
            Ok(Err(e)) => {
                tracing::warn!("{}, using the raw recording", e);
                None
            }
            Err(e) => {
                tracing::warn!("Sound cleanup worker failed: {}, using the raw recording", e);
                None
            }
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, TaskError> {
        let chat = self
            .ctx
            .gate
            .get::<ChatBackend>(CHAT, self.ctx.wait_timeout())
            .await?;
        let model = self.ctx.config.llm.model.clone();

        tracing::debug!("Calling LLM with {} messages", messages.len());
        let answer = tokio::task::spawn_blocking(move || chat.complete(&model, &messages))
            .await
            .map_err(|e| TaskError::Worker(e.to_string()))??;

        self.ctx.activity.record(&format!("LLM answer: {}", answer));
        Ok(answer)
    }

    async fn deliver(&self, text: &str) -> Result<(), TaskError> {
        output::deliver(
            self.ctx.clipboard.as_ref(),
            self.ctx.paste.as_ref(),
            &self.ctx.config.output,
            text,
        )
        .await?;
        Ok(())
    }

    async fn write(&self, params: &TaskParams, transcript: &str) -> Result<(), TaskError> {
        let text = match params.instruction {
            Some(ref instruction) => {
                let answer = self
                    .chat(vec![
                        ChatMessage::system(instruction.clone()),
                        ChatMessage::user(transcript),
                    ])
                    .await?;
                self.ctx.notifier.notify(&answer, notification::LONG).await;
                answer
            }
            None => transcript.to_string(),
        };

        self.deliver(&text).await
    }

    async fn transform(&self, clipboard: &str, instruction: &str) -> Result<(), TaskError> {
        ensure_size("Transcript", instruction)?;

        let answer = self
            .chat(vec![
                ChatMessage::system(self.ctx.config.llm.transform_system_prompt.clone()),
                ChatMessage::user(transform_request(clipboard, instruction)),
            ])
            .await?;
        self.ctx.notifier.notify(&answer, notification::LONG).await;

        self.deliver(&answer).await
    }

    async fn voice_chat(
        &self,
        kind: TaskKind,
        params: &TaskParams,
        transcript: &str,
    ) -> Result<(), TaskError> {
        let mut conversation = self.open_conversation(kind)?;

        let mut messages = Vec::with_capacity(conversation.turns.len() + 2);
        messages.push(ChatMessage::system(
            self.ctx.config.llm.voice_system_prompt.clone(),
        ));
        messages.extend(conversation.turns.iter().cloned());
        messages.push(ChatMessage::user(transcript));

        let answer = self.chat(messages).await?;
        self.ctx.notifier.notify(&answer, notification::LONG).await;

        let spoken = if self.ctx.flags.voice_enabled() {
            let engine = params.voice_engine.unwrap_or(self.ctx.config.speech.engine);
            let language = params
                .language
                .clone()
                .unwrap_or_else(|| self.ctx.config.transcription.language.clone());
            self.speak(engine, &answer, &language).await
        } else {
            tracing::debug!("Voice is off, not speaking the answer");
            Ok(())
        };

        // The exchange is kept even when speaking failed
        let store = &self.ctx.conversations;
        store.append_turn(&mut conversation, Role::User, transcript)?;
        store.append_turn(&mut conversation, Role::Assistant, &answer)?;

        spoken
    }

    fn open_conversation(&self, kind: TaskKind) -> Result<Conversation, TaskError> {
        let store = &self.ctx.conversations;
        if kind == TaskKind::ContinueVoiceChat {
            if let Some(conversation) = store.load_most_recent()? {
                return Ok(conversation);
            }
            tracing::info!("No previous conversation, starting a new one");
        }
        store.create_new()
    }

    async fn speak(
        &self,
        engine: VoiceEngine,
        text: &str,
        language: &str,
    ) -> Result<(), TaskError> {
        if engine == VoiceEngine::None {
            return Ok(());
        }

        let backends = self
            .ctx
            .gate
            .get::<SpeechBackends>(SPEECH, self.ctx.wait_timeout())
            .await?;

        match self.synthesize_and_play(&backends, engine, text, language).await {
            Err(TaskError::Playback(e)) if engine != VoiceEngine::Espeak => {
                tracing::warn!(
                    "Failed to play the {} answer, falling back to espeak: {}",
                    engine_name(engine),
                    e
                );
                self.synthesize_and_play(&backends, VoiceEngine::Espeak, text, language)
                    .await
            }
            result => result,
        }
    }

    async fn synthesize_and_play(
        &self,
        backends: &Arc<SpeechBackends>,
        engine: VoiceEngine,
        text: &str,
        language: &str,
    ) -> Result<(), TaskError> {
        tracing::debug!("Speaking answer with {}", engine_name(engine));
        let backends = Arc::clone(backends);
        let (text, language) = (text.to_string(), language.to_string());
        let audio =
            tokio::task::spawn_blocking(move || backends.synthesize(engine, &text, &language))
                .await
                .map_err(|e| TaskError::Worker(e.to_string()))??;

        let Some(audio) = audio else {
            return Ok(());
        };

        let players = self.ctx.players.clone();
        tokio::task::spawn_blocking(move || play_to_end(&players, &audio))
            .await
            .map_err(|e| TaskError::Worker(e.to_string()))?
            .map_err(TaskError::Playback)
    }
}

/// User message for `transform_clipboard`
pub fn transform_request(clipboard: &str, instruction: &str) -> String {
    format!("INPUT_TEXT: '{}'\n\nINSTRUCTION: '{}'", clipboard, instruction)
}

fn ensure_size(what: &'static str, text: &str) -> Result<(), TaskError> {
    let chars = text.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(TaskError::ContentTooLarge {
            what,
            chars,
            limit: MAX_CONTENT_CHARS,
        });
    }
    Ok(())
}

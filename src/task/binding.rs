//! Task letters and what they trigger

use crate::config::{expand_home, BindingSpec, VoiceEngine};
use crate::error::ChordvoxError;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What a dispatched task does with the transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Copy the transcript (optionally rewritten by the LLM) to the clipboard
    Write,
    /// Apply the spoken instruction to the clipboard content
    TransformClipboard,
    /// Start a new spoken conversation
    NewVoiceChat,
    /// Continue the most recent conversation
    ContinueVoiceChat,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Write => "write",
            TaskKind::TransformClipboard => "transform_clipboard",
            TaskKind::NewVoiceChat => "new_voice_chat",
            TaskKind::ContinueVoiceChat => "continue_voice_chat",
        }
    }

    pub fn is_voice_chat(&self) -> bool {
        matches!(self, TaskKind::NewVoiceChat | TaskKind::ContinueVoiceChat)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "write" => Ok(TaskKind::Write),
            "transform_clipboard" => Ok(TaskKind::TransformClipboard),
            "new_voice_chat" => Ok(TaskKind::NewVoiceChat),
            "continue_voice_chat" => Ok(TaskKind::ContinueVoiceChat),
            other => Err(format!(
                "unknown task '{}' (write, transform_clipboard, new_voice_chat, continue_voice_chat)",
                other
            )),
        }
    }
}

/// Runtime switches a letter can flip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    /// Speak voice chat answers or not
    Voice,
}

impl FromStr for ToggleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voice" | "voice_on_off" | "voice-on-off" => Ok(ToggleAction::Voice),
            other => Err(format!("unknown toggle '{}' (voice)", other)),
        }
    }
}

/// Per-binding overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskParams {
    /// LLM instruction applied to the transcript before writing it
    pub instruction: Option<String>,
    /// Transcription prompt
    pub prompt: Option<String>,
    /// Transcription language
    pub language: Option<String>,
    pub voice_engine: Option<VoiceEngine>,
}

/// The action bound to a task letter
#[derive(Debug, Clone, PartialEq)]
pub enum TaskBinding {
    Task { kind: TaskKind, params: TaskParams },
    Toggle(ToggleAction),
}

/// Bindings keyed by lowercase letter
pub type Bindings = HashMap<char, TaskBinding>;

/// Validate config bindings and read `*_file` parameters
pub fn resolve_bindings(specs: &BTreeMap<String, BindingSpec>) -> Result<Bindings, ChordvoxError> {
    let mut bindings = Bindings::new();

    for (key, spec) in specs {
        let invalid = |reason: String| ChordvoxError::ChordBindingInvalid {
            key: key.clone(),
            reason,
        };

        let mut chars = key.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            _ => return Err(invalid("binding keys must be a single letter or digit".into())),
        };

        let binding = match (&spec.task, &spec.toggle) {
            (Some(task), None) => TaskBinding::Task {
                kind: task.parse().map_err(invalid)?,
                params: TaskParams {
                    instruction: text_or_file(&spec.instruction, &spec.instruction_file)
                        .map_err(invalid)?,
                    prompt: text_or_file(&spec.prompt, &spec.prompt_file).map_err(invalid)?,
                    language: spec.language.clone(),
                    voice_engine: spec.voice_engine,
                },
            },
            (None, Some(toggle)) => TaskBinding::Toggle(toggle.parse().map_err(invalid)?),
            (Some(_), Some(_)) => {
                return Err(invalid("set either 'task' or 'toggle', not both".into()))
            }
            (None, None) => return Err(invalid("missing 'task' or 'toggle'".into())),
        };

        if bindings.insert(letter, binding).is_some() {
            return Err(invalid(format!("letter '{}' is bound twice", letter)));
        }
    }

    Ok(bindings)
}

fn text_or_file(
    text: &Option<String>,
    file: &Option<std::path::PathBuf>,
) -> Result<Option<String>, String> {
    match (text, file) {
        (Some(_), Some(_)) => Err("set a parameter or its _file variant, not both".into()),
        (Some(text), None) => Ok(Some(text.clone())),
        (None, Some(path)) => read_param_file(&expand_home(path)).map(Some),
        (None, None) => Ok(None),
    }
}

fn read_param_file(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path)
        .map(|contents| contents.trim_end().to_string())
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

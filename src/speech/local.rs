//! Subprocess speech engines: piper and espeak
//!
//! Text goes through stdin so answers starting with `-` are never parsed
//! as options.

use super::SpeechSynthesizer;
use crate::error::SpeechError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run `program` with `text` on stdin and fail on a non-zero exit
fn run_with_stdin(program: &str, args: &[String], text: &str) -> Result<(), SpeechError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SpeechError::NotInstalled(program.to_string())
            } else {
                SpeechError::CommandFailed(format!("{}: {}", program, e))
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
        // Close stdin to signal EOF
        drop(stdin);
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(SpeechError::CommandFailed(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// piper with one voice model per language
pub struct PiperSynthesizer {
    models: BTreeMap<String, String>,
}

impl PiperSynthesizer {
    pub fn new(models: BTreeMap<String, String>) -> Self {
        Self { models }
    }

    fn args(&self, language: &str, out: &Path) -> Result<Vec<String>, SpeechError> {
        let model = self
            .models
            .get(language)
            .ok_or_else(|| SpeechError::NoVoiceModel(language.to_string()))?;
        Ok(vec![
            "--model".to_string(),
            model.clone(),
            "--output_file".to_string(),
            out.display().to_string(),
        ])
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str, language: &str, out: &Path) -> Result<(), SpeechError> {
        let args = self.args(language, out)?;
        tracing::debug!("Running piper {:?}", args);
        run_with_stdin("piper", &args, text)
    }
}

/// espeak writing a WAV file
pub struct EspeakSynthesizer {
    pitch: u32,
    speed: u32,
}

impl EspeakSynthesizer {
    pub fn new(pitch: u32, speed: u32) -> Self {
        Self { pitch, speed }
    }

    fn args(&self, language: &str, out: &Path) -> Vec<String> {
        vec![
            "-v".to_string(),
            language.to_string(),
            "-p".to_string(),
            self.pitch.to_string(),
            "-s".to_string(),
            self.speed.to_string(),
            "-z".to_string(),
            "-w".to_string(),
            out.display().to_string(),
            "--stdin".to_string(),
        ]
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn synthesize(&self, text: &str, language: &str, out: &Path) -> Result<(), SpeechError> {
        run_with_stdin("espeak", &self.args(language, out), text)
    }
}

//! Recording session lifecycle
//!
//! A recording is an external capture command (sox `rec` by default) writing
//! to a temporary WAV file. The controller allows one session at a time. The
//! session owns the capture process and terminates it exactly once: on
//! `stop`, or on drop if the task bailed out early.
//!
//! A finished recording can optionally be filtered through sox before it is
//! transcribed, see [`cleanup_recording`].

use crate::error::{AudioError, TaskError};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempPath;

/// Starts the platform capture mechanism
pub trait CaptureBackend: Send + Sync {
    /// Begin recording into `path`
    fn spawn(&self, path: &Path) -> Result<Box<dyn CaptureHandle>, AudioError>;
}

/// A running capture
pub trait CaptureHandle: Send {
    /// Stop recording and wait for the capture to flush its file
    fn terminate(&mut self) -> Result<(), AudioError>;
}

/// Capture through an external command with a `{file}` placeholder
pub struct CommandCapture {
    command: Vec<String>,
}

impl CommandCapture {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl CaptureBackend for CommandCapture {
    fn spawn(&self, path: &Path) -> Result<Box<dyn CaptureHandle>, AudioError> {
        let command_line = self.command.join(" ");
        let (program, args) = self.command.split_first().ok_or_else(|| AudioError::CaptureSpawn {
            command: command_line.clone(),
            reason: "empty capture command".to_string(),
        })?;

        let path = path.to_string_lossy();
        let mut cmd = Command::new(program);
        cmd.args(args.iter().map(|arg| arg.replace("{file}", &path)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group, so termination reaches every child of the command
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| AudioError::CaptureSpawn {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Capture started (pid {}): {}", child.id(), command_line);
        Ok(Box::new(ChildCapture { child }))
    }
}

struct ChildCapture {
    child: Child,
}

impl CaptureHandle for ChildCapture {
    fn terminate(&mut self) -> Result<(), AudioError> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let pgid = Pid::from_raw(self.child.id() as i32);
            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                // ESRCH: the command already exited on its own
                if e != nix::errno::Errno::ESRCH {
                    return Err(AudioError::CaptureStop(format!("SIGTERM failed: {}", e)));
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill();
        }

        let status = self
            .child
            .wait()
            .map_err(|e| AudioError::CaptureStop(e.to_string()))?;
        tracing::debug!("Capture process exited: {}", status);
        Ok(())
    }
}

/// One in-flight recording
pub struct RecordingSession {
    id: String,
    path: TempPath,
    started: Instant,
    ended: Option<Instant>,
    handle: Option<Box<dyn CaptureHandle>>,
    active: Arc<Mutex<Option<String>>>,
}

impl RecordingSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Recorded audio file, removed when the session is dropped
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.ended.is_some()
    }

    fn finish(&mut self) -> Result<(), AudioError> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        self.ended = Some(Instant::now());
        let result = handle.terminate();
        release(&self.active, &self.id);
        result
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::debug!("Recording {} dropped while running, stopping capture", self.id);
            if let Err(e) = self.finish() {
                tracing::warn!("Failed to stop capture for {}: {}", self.id, e);
            }
        }
    }
}

fn release(active: &Mutex<Option<String>>, id: &str) {
    let mut active = active.lock().unwrap_or_else(|e| e.into_inner());
    if active.as_deref() == Some(id) {
        *active = None;
    }
}

/// Owns the single recording slot
pub struct RecordingController {
    backend: Box<dyn CaptureBackend>,
    active: Arc<Mutex<Option<String>>>,
}

impl RecordingController {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Start recording, failing if another session is still active
    pub fn start(&self, id: &str) -> Result<RecordingSession, AudioError> {
        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(current) = active.as_ref() {
                return Err(AudioError::AlreadyRecording(current.clone()));
            }
            *active = Some(id.to_string());
        }

        let session = tempfile::Builder::new()
            .prefix("chordvox-")
            .suffix(".wav")
            .tempfile()
            .map(|file| file.into_temp_path())
            .map_err(|e| AudioError::CaptureSpawn {
                command: "tempfile".to_string(),
                reason: e.to_string(),
            })
            .and_then(|path| {
                let handle = self.backend.spawn(&path)?;
                Ok(RecordingSession {
                    id: id.to_string(),
                    path,
                    started: Instant::now(),
                    ended: None,
                    handle: Some(handle),
                    active: self.active.clone(),
                })
            });

        if session.is_err() {
            release(&self.active, id);
        }
        let session = session?;
        tracing::info!("Recording started ({})", session.id);
        Ok(session)
    }

    /// Stop the capture; calling it again is a no-op
    pub fn stop(&self, session: &mut RecordingSession) -> Result<(), AudioError> {
        if session.handle.is_none() {
            return Ok(());
        }
        session.finish()?;
        if let Ok(duration) = self.duration(session) {
            tracing::info!(
                "Recording stopped ({}, {:.2}s)",
                session.id,
                duration.as_secs_f32()
            );
        }
        Ok(())
    }

    /// Time between start and stop
    pub fn duration(&self, session: &RecordingSession) -> Result<Duration, AudioError> {
        session
            .ended
            .map(|ended| ended.duration_since(session.started))
            .ok_or_else(|| AudioError::SessionNotFinished(session.id.clone()))
    }

    pub fn is_recording(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// sox effects for speech: band-pass to the voice range, normalize, cap
/// silences at one second, and pad the start with 0.2s of silence
#[rustfmt::skip]
pub const CLEANUP_EFFECTS: &[&str] = &[
    "highpass", "-1", "100",
    "lowpass", "-1", "3000",
    "highpass", "-2", "50",
    "lowpass", "-2", "5000",
    "norm",
    "silence", "-l", "1", "0", "0.5%", "-1", "1.0", "0.1%",
    "pad", "0.2@0",
];

/// Run the cleanup command over `input`, returning the cleaned WAV file
///
/// `{input}` and `{output}` in `command` are replaced with the paths. The
/// returned file is removed when dropped.
pub fn cleanup_recording(command: &[String], input: &Path) -> Result<TempPath, AudioError> {
    let display = command.join(" ");
    let failed = |reason: String| AudioError::Cleanup {
        command: display.clone(),
        reason,
    };

    let (program, args) = command
        .split_first()
        .ok_or_else(|| failed("empty cleanup command".to_string()))?;

    let output = tempfile::Builder::new()
        .prefix("chordvox-clean-")
        .suffix(".wav")
        .tempfile()
        .map(|file| file.into_temp_path())
        .map_err(|e| failed(e.to_string()))?;

    let (input_str, output_str) = (input.to_string_lossy(), output.to_string_lossy());
    let result = Command::new(program)
        .args(args.iter().map(|arg| {
            arg.replace("{input}", &input_str)
                .replace("{output}", &output_str)
        }))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                failed(format!("{} not found in PATH", program))
            } else {
                failed(e.to_string())
            }
        })?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(failed(format!("{}: {}", result.status, stderr.trim())));
    }

    tracing::debug!("Cleaned recording {:?} into {:?}", input, output);
    Ok(output)
}

/// Reject recordings shorter than `min_secs`; exactly `min_secs` is accepted
pub fn ensure_min_duration(duration: Duration, min_secs: f32) -> Result<(), TaskError> {
    let minimum = Duration::from_secs_f32(min_secs.max(0.0));
    if duration < minimum {
        return Err(TaskError::RecordingTooShort {
            secs: duration.as_secs_f32(),
            min_secs,
        });
    }
    Ok(())
}

//! System clipboard access
//!
//! Uses wl-copy/wl-paste on Wayland and xclip on X11.
//!
//! Requires: wl-clipboard or xclip package installed

use super::Clipboard;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTool {
    WlClipboard,
    Xclip,
}

impl ClipboardTool {
    /// Pick the tool for the current session
    ///
    /// Wayland sessions prefer wl-clipboard; xclip is used otherwise or when
    /// wl-copy is missing.
    pub fn detect() -> Self {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        if wayland && which::which("wl-copy").is_ok() {
            ClipboardTool::WlClipboard
        } else if which::which("xclip").is_ok() {
            ClipboardTool::Xclip
        } else if wayland {
            ClipboardTool::WlClipboard
        } else {
            ClipboardTool::Xclip
        }
    }

    fn read_command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ClipboardTool::WlClipboard => ("wl-paste", &["--no-newline"]),
            ClipboardTool::Xclip => ("xclip", &["-selection", "clipboard", "-o"]),
        }
    }

    fn write_command(self) -> (&'static str, &'static [&'static str]) {
        match self {
            ClipboardTool::WlClipboard => ("wl-copy", &[]),
            ClipboardTool::Xclip => ("xclip", &["-selection", "clipboard"]),
        }
    }

    fn not_found(self) -> OutputError {
        match self {
            ClipboardTool::WlClipboard => OutputError::WlCopyNotFound,
            ClipboardTool::Xclip => OutputError::XclipNotFound,
        }
    }
}

/// Clipboard backed by the session's clipboard tool
pub struct SystemClipboard {
    tool: ClipboardTool,
}

impl SystemClipboard {
    pub fn new(tool: ClipboardTool) -> Self {
        Self { tool }
    }

    pub fn detect() -> Self {
        let tool = ClipboardTool::detect();
        tracing::debug!("Using clipboard tool {:?}", tool);
        Self::new(tool)
    }

    fn map_spawn_error(&self, e: std::io::Error) -> OutputError {
        if e.kind() == std::io::ErrorKind::NotFound {
            self.tool.not_found()
        } else {
            OutputError::ClipboardFailed(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Clipboard for SystemClipboard {
    async fn read(&self) -> Result<String, OutputError> {
        let (program, args) = self.tool.read_command();
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.map_spawn_error(e))?;

        // Both tools exit non-zero when nothing has been copied yet
        if !output.status.success() {
            tracing::debug!(
                "{} reported no clipboard content: {}",
                program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(String::new());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn write(&self, text: &str) -> Result<(), OutputError> {
        let (program, args) = self.tool.write_command();

        // Spawn with stdin pipe
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.map_spawn_error(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| OutputError::ClipboardFailed(e.to_string()))?;

            // Close stdin to signal EOF
            drop(stdin);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| OutputError::ClipboardFailed(e.to_string()))?;

        if !status.success() {
            return Err(OutputError::ClipboardFailed(format!(
                "{} exited with error",
                program
            )));
        }

        tracing::debug!("Copied {} chars via {}", text.chars().count(), program);
        Ok(())
    }
}

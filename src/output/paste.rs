//! Paste keystroke simulation
//!
//! ydotool works on all Wayland compositors through uinput and needs the
//! ydotoold daemon (systemctl --user start ydotool). xdotool covers X11
//! sessions without it.

use super::PasteKeys;
use crate::error::OutputError;
use std::process::Stdio;
use tokio::process::Command;

/// Ctrl+V through ydotool
pub struct YdotoolPaste;

#[async_trait::async_trait]
impl PasteKeys for YdotoolPaste {
    async fn paste(&self) -> Result<(), OutputError> {
        // 29 = KEY_LEFTCTRL, 47 = KEY_V
        // Format: key_code:1 (press) then key_code:0 (release)
        let output = Command::new("ydotool")
            .args(["key", "29:1", "47:1", "47:0", "29:0"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::YdotoolNotFound
                } else {
                    OutputError::PasteFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_ydotool_error(&stderr));
        }

        Ok(())
    }

    async fn is_available(&self) -> bool {
        which::which("ydotool").is_ok()
    }

    fn name(&self) -> &'static str {
        "ydotool"
    }
}

fn classify_ydotool_error(stderr: &str) -> OutputError {
    if stderr.contains("socket") || stderr.contains("connect") || stderr.contains("daemon") {
        OutputError::YdotoolNotRunning
    } else {
        OutputError::PasteFailed(stderr.trim().to_string())
    }
}

/// Ctrl+V through xdotool (X11)
pub struct XdotoolPaste;

#[async_trait::async_trait]
impl PasteKeys for XdotoolPaste {
    async fn paste(&self) -> Result<(), OutputError> {
        let output = Command::new("xdotool")
            .args(["key", "--clearmodifiers", "ctrl+v"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    OutputError::XdotoolNotFound
                } else {
                    OutputError::PasteFailed(e.to_string())
                }
            })?;

        if !output.status.success() {
            return Err(OutputError::PasteFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(())
    }

    async fn is_available(&self) -> bool {
        std::env::var_os("DISPLAY").is_some() && which::which("xdotool").is_ok()
    }

    fn name(&self) -> &'static str {
        "xdotool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ydotool_daemon_errors() {
        assert!(matches!(
            classify_ydotool_error("failed to connect socket `/run/user/1000/.ydotool_socket'"),
            OutputError::YdotoolNotRunning
        ));
        assert!(matches!(
            classify_ydotool_error("something else\n"),
            OutputError::PasteFailed(msg) if msg == "something else"
        ));
    }
}

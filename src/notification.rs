//! Platform-specific desktop notifications
//!
//! Provides a unified interface for sending desktop notifications on
//! different platforms:
//! - Linux: Uses notify-send (libnotify)
//! - macOS: Uses osascript (AppleScript)
//!
//! Notifications are best-effort: failures are logged, never returned.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const APP_NAME: &str = "Chordvox";

/// Longest message body shown in a notification
const MAX_BODY_CHARS: usize = 300;

/// Default display time for status messages
pub const SHORT: Duration = Duration::from_secs(2);

/// Display time for transcripts and answers
pub const LONG: Duration = Duration::from_secs(10);

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, timeout: Duration);
}

/// Notifier that talks to the desktop notification daemon
pub struct DesktopNotifier;

#[async_trait::async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self, message: &str, timeout: Duration) {
        let body = truncate(message, MAX_BODY_CHARS);
        tracing::debug!("Notify: {}", body);

        #[cfg(target_os = "linux")]
        send_linux(&body, timeout).await;

        #[cfg(target_os = "macos")]
        {
            let _ = timeout; // osascript has no expiry option
            send_macos(&body).await;
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            tracing::debug!("Notifications not supported on this platform");
            let _ = (body, timeout); // Suppress unused warnings
        }
    }
}

/// Notifier that only logs, for headless runs
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str, _timeout: Duration) {
        tracing::info!("{}", message);
    }
}

/// Send a notification on Linux using notify-send
#[cfg(target_os = "linux")]
async fn send_linux(body: &str, timeout: Duration) {
    let result = Command::new("notify-send")
        .args([
            &format!("--app-name={}", APP_NAME),
            &format!("--expire-time={}", timeout.as_millis()),
            APP_NAME,
            body,
        ])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

/// Send notification via osascript
#[cfg(target_os = "macos")]
async fn send_macos(body: &str) {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        escape_applescript(body),
        APP_NAME
    );

    let result = Command::new("osascript")
        .args(["-e", &script])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if let Err(e) = result {
        tracing::debug!("Failed to send notification: {}", e);
    }
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Truncate to `max` characters, marking the cut with an ellipsis
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

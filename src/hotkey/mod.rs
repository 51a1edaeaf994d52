//! Key release listeners
//!
//! Chords are detected from key *releases*, so listeners report every
//! release with a normalized key name, the character the key produces (if
//! any), and the time it happened.
//!
//! - evdev: kernel-level events from /dev/input, works on every Wayland
//!   compositor. Requires the user to be in the 'input' group.
//! - rdev: display-server events (X11, macOS, Windows).

#[cfg(target_os = "linux")]
pub mod evdev_listener;
pub mod rdev_listener;

use crate::config::{HotkeyConfig, ListenerBackend};
use crate::error::HotkeyError;
use std::time::Instant;
use tokio::sync::mpsc;

/// A key was released
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRelease {
    /// Normalized key name, e.g. "LEFTSHIFT", "ESC", "W"
    pub key: String,
    /// Lowercase character for letter and digit keys
    pub ch: Option<char>,
    pub at: Instant,
}

impl KeyRelease {
    /// Build a release event from any key name spelling
    pub fn new(key: &str, at: Instant) -> Self {
        let key = normalize_key_name(key);
        let ch = key_char(&key);
        Self { key, ch, at }
    }
}

/// Trait for key listener implementations
#[async_trait::async_trait]
pub trait KeyListener: Send {
    /// Start listening; the channel closes if the listener dies
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyRelease>, HotkeyError>;

    /// Stop listening and clean up
    async fn stop(&mut self) -> Result<(), HotkeyError>;
}

/// Factory function to create the configured key listener
pub fn create_listener(config: &HotkeyConfig) -> Result<Box<dyn KeyListener>, HotkeyError> {
    match config.backend {
        #[cfg(target_os = "linux")]
        ListenerBackend::Evdev => Ok(Box::new(evdev_listener::EvdevListener::new(config)?)),
        #[cfg(not(target_os = "linux"))]
        ListenerBackend::Evdev => Err(HotkeyError::NotSupported(
            "evdev is only available on Linux, set hotkey.backend = \"rdev\"".to_string(),
        )),
        ListenerBackend::Rdev => Ok(Box::new(rdev_listener::RdevListener::new(config)?)),
    }
}

/// Normalize a key name: uppercase, `-`/space to `_`, no `KEY_` prefix,
/// common aliases folded to one spelling
pub fn normalize_key_name(name: &str) -> String {
    let normalized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();

    let bare = normalized
        .strip_prefix("KEY_")
        .unwrap_or(&normalized)
        .to_string();

    match bare.as_str() {
        "LSHIFT" | "SHIFT" | "SHIFT_LEFT" | "SHIFTLEFT" => "LEFTSHIFT".to_string(),
        "RSHIFT" | "SHIFT_RIGHT" | "SHIFTRIGHT" => "RIGHTSHIFT".to_string(),
        "LCTRL" | "CTRL" | "CONTROL_LEFT" | "CONTROLLEFT" => "LEFTCTRL".to_string(),
        "RCTRL" | "CONTROL_RIGHT" | "CONTROLRIGHT" => "RIGHTCTRL".to_string(),
        "LALT" | "ALT" => "LEFTALT".to_string(),
        "RALT" | "ALTGR" => "RIGHTALT".to_string(),
        "LMETA" | "SUPER" | "META_LEFT" | "METALEFT" => "LEFTMETA".to_string(),
        "RMETA" | "META_RIGHT" | "METARIGHT" => "RIGHTMETA".to_string(),
        "ESCAPE" => "ESC".to_string(),
        "RETURN" => "ENTER".to_string(),
        _ => bare,
    }
}

/// Character produced by a normalized key name, for letters and digits
pub fn key_char(key: &str) -> Option<char> {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(c.to_ascii_lowercase()),
        _ => None,
    }
}

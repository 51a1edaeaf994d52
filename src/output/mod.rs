//! Clipboard and paste output
//!
//! Task results always land on the clipboard. With `auto_paste` enabled
//! they are also pasted into the focused window with a simulated Ctrl+V,
//! optionally restoring the previous clipboard afterwards.
//!
//! Paste keystroke fallback chain:
//! 1. ydotool - Works on X11/Wayland/TTY, requires daemon
//! 2. xdotool - X11 only

pub mod clipboard;
pub mod paste;

use crate::config::OutputConfig;
use crate::error::OutputError;
use std::time::Duration;

/// Read and write the system clipboard
#[async_trait::async_trait]
pub trait Clipboard: Send + Sync {
    /// Current clipboard text, empty when nothing is copied
    async fn read(&self) -> Result<String, OutputError>;

    /// Replace the clipboard contents
    async fn write(&self, text: &str) -> Result<(), OutputError>;
}

/// Simulate the paste keystroke in the focused window
#[async_trait::async_trait]
pub trait PasteKeys: Send + Sync {
    async fn paste(&self) -> Result<(), OutputError>;

    /// Check if this paste method is available
    async fn is_available(&self) -> bool;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Paste methods tried in order
pub struct PasteChain {
    methods: Vec<Box<dyn PasteKeys>>,
}

impl PasteChain {
    pub fn new(methods: Vec<Box<dyn PasteKeys>>) -> Self {
        Self { methods }
    }

    /// ydotool, then xdotool
    pub fn system() -> Self {
        Self::new(vec![
            Box::new(paste::YdotoolPaste),
            Box::new(paste::XdotoolPaste),
        ])
    }
}

#[async_trait::async_trait]
impl PasteKeys for PasteChain {
    async fn paste(&self) -> Result<(), OutputError> {
        for method in &self.methods {
            if !method.is_available().await {
                tracing::debug!("{} not available, trying next", method.name());
                continue;
            }

            match method.paste().await {
                Ok(()) => {
                    tracing::debug!("Pasted via {}", method.name());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}, trying next", method.name(), e);
                }
            }
        }

        Err(OutputError::AllMethodsFailed)
    }

    async fn is_available(&self) -> bool {
        for method in &self.methods {
            if method.is_available().await {
                return true;
            }
        }
        false
    }

    fn name(&self) -> &'static str {
        "paste chain"
    }
}

/// Put a task result on the clipboard and paste it if configured
pub async fn deliver(
    clipboard: &dyn Clipboard,
    paste: &dyn PasteKeys,
    config: &OutputConfig,
    text: &str,
) -> Result<(), OutputError> {
    if text.is_empty() {
        return Ok(());
    }

    if !config.auto_paste {
        clipboard.write(text).await?;
        tracing::info!("Result copied to clipboard ({} chars)", text.chars().count());
        return Ok(());
    }

    let previous = if config.restore_clipboard {
        match clipboard.read().await {
            Ok(previous) => Some(previous),
            Err(e) => {
                tracing::warn!("Could not save clipboard before pasting: {}", e);
                None
            }
        }
    } else {
        None
    };

    clipboard.write(text).await?;

    // Small delay to ensure clipboard is set before pasting
    tokio::time::sleep(Duration::from_millis(config.paste_delay_ms)).await;
    let pasted = paste.paste().await;

    if let Some(previous) = previous.filter(|p| !p.is_empty()) {
        tokio::time::sleep(Duration::from_millis(config.paste_delay_ms)).await;
        if let Err(e) = clipboard.write(&previous).await {
            tracing::warn!("Failed to restore clipboard: {}", e);
        }
    }

    pasted?;
    tracing::info!("Result pasted ({} chars)", text.chars().count());
    Ok(())
}

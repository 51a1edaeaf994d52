//! rdev-based key listener for X11, macOS and Windows
//!
//! `rdev::listen` blocks its thread for the life of the process and has no
//! way to unregister, so stopping only detaches the callback from the
//! channel.

use super::{KeyListener, KeyRelease};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use rdev::{Event, EventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

pub struct RdevListener {
    stopped: Option<Arc<AtomicBool>>,
}

impl RdevListener {
    pub fn new(_config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        Ok(Self { stopped: None })
    }
}

#[async_trait::async_trait]
impl KeyListener for RdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyRelease>, HotkeyError> {
        let (tx, rx) = mpsc::channel(64);
        let stopped = Arc::new(AtomicBool::new(false));
        self.stopped = Some(stopped.clone());

        std::thread::Builder::new()
            .name("rdev-listener".to_string())
            .spawn(move || {
                let callback = move |event: Event| {
                    if stopped.load(Ordering::Relaxed) {
                        return;
                    }
                    if let EventType::KeyRelease(key) = event.event_type {
                        let release = KeyRelease::new(&rdev_key_name(&key), Instant::now());
                        tracing::trace!("Released {}", release.key);
                        if tx.blocking_send(release).is_err() {
                            stopped.store(true, Ordering::Relaxed);
                        }
                    }
                };

                // Only returns on failure; dropping the sender tells the dispatcher
                if let Err(e) = rdev::listen(callback) {
                    tracing::error!("rdev listener failed: {:?}", e);
                }
            })
            .map_err(|e| HotkeyError::ListenerStopped(e.to_string()))?;

        tracing::info!("Listening for key releases via rdev");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stopped) = self.stopped.take() {
            stopped.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Map an rdev key to the evdev-style name used in the config
fn rdev_key_name(key: &rdev::Key) -> String {
    let debug = format!("{:?}", key);

    // KeyW -> W, Num7 -> 7
    for prefix in ["Key", "Num"] {
        if let Some(rest) = debug.strip_prefix(prefix) {
            if rest.len() == 1 {
                return rest.to_string();
            }
        }
    }

    match key {
        rdev::Key::BackQuote => "GRAVE".to_string(),
        _ => debug,
    }
}

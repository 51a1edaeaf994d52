//! evdev-based key listener
//!
//! Uses the Linux evdev interface to see key releases at the kernel level.
//! This works on all Wayland compositors because it bypasses the display server.
//!
//! The user must be in the 'input' group to access /dev/input/* devices.

use super::{KeyListener, KeyRelease};
use crate::config::HotkeyConfig;
use crate::error::HotkeyError;
use evdev::{Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// evdev-based key listener
pub struct EvdevListener {
    /// Paths to keyboard devices
    device_paths: Vec<PathBuf>,
    /// Signal to stop the listener task
    stop_signal: Option<oneshot::Sender<()>>,
}

impl EvdevListener {
    /// Create a listener over every keyboard device
    pub fn new(config: &HotkeyConfig) -> Result<Self, HotkeyError> {
        // Fail early on typos in the configured keys
        parse_key_name(&config.trigger_key)?;
        parse_key_name(&config.cancel_key)?;

        let device_paths = find_keyboard_devices()?;

        if device_paths.is_empty() {
            return Err(HotkeyError::NoKeyboard);
        }

        tracing::debug!(
            "Found {} keyboard device(s): {:?}",
            device_paths.len(),
            device_paths
        );

        Ok(Self {
            device_paths,
            stop_signal: None,
        })
    }
}

#[async_trait::async_trait]
impl KeyListener for EvdevListener {
    async fn start(&mut self) -> Result<mpsc::Receiver<KeyRelease>, HotkeyError> {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop_signal = Some(stop_tx);

        let device_paths = self.device_paths.clone();

        tokio::task::spawn_blocking(move || {
            evdev_listener_loop(device_paths, tx, stop_rx);
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), HotkeyError> {
        if let Some(stop) = self.stop_signal.take() {
            let _ = stop.send(());
        }
        Ok(())
    }
}

/// Main listener loop running in a blocking task
///
/// Returns (closing the channel) when stopped, when the receiver goes away,
/// or when every device has disappeared.
fn evdev_listener_loop(
    device_paths: Vec<PathBuf>,
    tx: mpsc::Sender<KeyRelease>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // Open all keyboard devices in non-blocking mode
    let mut devices: Vec<(PathBuf, Device)> = device_paths
        .into_iter()
        .filter_map(|path| match Device::open(&path) {
            Ok(device) => {
                let fd = device.as_raw_fd();
                unsafe {
                    let flags = libc::fcntl(fd, libc::F_GETFL);
                    if flags != -1 {
                        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                    }
                }
                tracing::debug!("Opened device (non-blocking): {:?}", path);
                Some((path, device))
            }
            Err(e) => {
                tracing::warn!("Failed to open {:?}: {}", path, e);
                None
            }
        })
        .collect();

    if devices.is_empty() {
        tracing::error!("No keyboard devices could be opened");
        return;
    }

    tracing::info!("Listening for key releases on {} device(s)", devices.len());

    loop {
        match stop_rx.try_recv() {
            Ok(_) | Err(oneshot::error::TryRecvError::Closed) => {
                tracing::debug!("Key listener stopping");
                return;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }

        let mut lost = Vec::new();

        for (index, (path, device)) in devices.iter_mut().enumerate() {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    tracing::warn!("Lost keyboard {:?}: {}", path, e);
                    lost.push(index);
                    continue;
                }
            };

            for event in events {
                // value 0 = release, 1 = press, 2 = autorepeat
                if let InputEventKind::Key(key) = event.kind() {
                    if event.value() == 0 {
                        let release = KeyRelease::new(&format!("{:?}", key), Instant::now());
                        tracing::trace!("Released {}", release.key);
                        if tx.blocking_send(release).is_err() {
                            return; // Channel closed
                        }
                    }
                }
            }
        }

        for index in lost.into_iter().rev() {
            devices.remove(index);
        }
        if devices.is_empty() {
            tracing::error!("All keyboard devices disappeared");
            return;
        }

        // Small sleep to avoid busy-waiting
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

/// Find all keyboard input devices
fn find_keyboard_devices() -> Result<Vec<PathBuf>, HotkeyError> {
    let mut keyboards = Vec::new();

    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| HotkeyError::DeviceAccess(format!("/dev/input: {}", e)))?;

    for entry in input_dir {
        let entry = entry.map_err(|e| HotkeyError::DeviceAccess(e.to_string()))?;
        let path = entry.path();

        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);

        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                // A keyboard should have at least some letter keys
                let has_keys = device
                    .supported_keys()
                    .map(|keys| {
                        keys.contains(Key::KEY_A)
                            && keys.contains(Key::KEY_Z)
                            && keys.contains(Key::KEY_ENTER)
                    })
                    .unwrap_or(false);

                if has_keys {
                    tracing::debug!(
                        "Found keyboard: {:?} ({:?})",
                        path,
                        device.name().unwrap_or("unknown")
                    );
                    keyboards.push(path);
                }
            }
            Err(e) => {
                // Permission denied is common for non-input-group users
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(HotkeyError::DeviceAccess(path.display().to_string()));
                }
                tracing::trace!("Skipping {:?}: {}", path, e);
            }
        }
    }

    Ok(keyboards)
}

/// Parse a key name string to an evdev Key
fn parse_key_name(name: &str) -> Result<Key, HotkeyError> {
    let key_name = format!("KEY_{}", super::normalize_key_name(name));

    let key = match key_name.as_str() {
        // Modifier keys (the usual chord triggers)
        "KEY_LEFTSHIFT" => Key::KEY_LEFTSHIFT,
        "KEY_RIGHTSHIFT" => Key::KEY_RIGHTSHIFT,
        "KEY_LEFTCTRL" => Key::KEY_LEFTCTRL,
        "KEY_RIGHTCTRL" => Key::KEY_RIGHTCTRL,
        "KEY_LEFTALT" => Key::KEY_LEFTALT,
        "KEY_RIGHTALT" => Key::KEY_RIGHTALT,
        "KEY_LEFTMETA" => Key::KEY_LEFTMETA,
        "KEY_RIGHTMETA" => Key::KEY_RIGHTMETA,

        // Lock keys
        "KEY_SCROLLLOCK" => Key::KEY_SCROLLLOCK,
        "KEY_PAUSE" => Key::KEY_PAUSE,
        "KEY_CAPSLOCK" => Key::KEY_CAPSLOCK,
        "KEY_NUMLOCK" => Key::KEY_NUMLOCK,
        "KEY_INSERT" => Key::KEY_INSERT,

        // Function keys
        "KEY_F1" => Key::KEY_F1,
        "KEY_F2" => Key::KEY_F2,
        "KEY_F3" => Key::KEY_F3,
        "KEY_F4" => Key::KEY_F4,
        "KEY_F5" => Key::KEY_F5,
        "KEY_F6" => Key::KEY_F6,
        "KEY_F7" => Key::KEY_F7,
        "KEY_F8" => Key::KEY_F8,
        "KEY_F9" => Key::KEY_F9,
        "KEY_F10" => Key::KEY_F10,
        "KEY_F11" => Key::KEY_F11,
        "KEY_F12" => Key::KEY_F12,

        // Keys commonly used to cancel
        "KEY_ESC" => Key::KEY_ESC,
        "KEY_BACKSPACE" => Key::KEY_BACKSPACE,
        "KEY_DELETE" => Key::KEY_DELETE,
        "KEY_SPACE" => Key::KEY_SPACE,
        "KEY_ENTER" => Key::KEY_ENTER,
        "KEY_TAB" => Key::KEY_TAB,
        "KEY_GRAVE" => Key::KEY_GRAVE,

        _ => {
            return Err(HotkeyError::UnknownKey(format!(
                "{}. Try: LEFTSHIFT, RIGHTCTRL, SCROLLLOCK, ESC, or run 'evtest' to find key names",
                name
            )));
        }
    };

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_name() {
        assert_eq!(parse_key_name("LEFTSHIFT").unwrap(), Key::KEY_LEFTSHIFT);
        assert_eq!(parse_key_name("lshift").unwrap(), Key::KEY_LEFTSHIFT);
        assert_eq!(parse_key_name("KEY_ESC").unwrap(), Key::KEY_ESC);
        assert_eq!(parse_key_name("Escape").unwrap(), Key::KEY_ESC);
        assert_eq!(parse_key_name("F12").unwrap(), Key::KEY_F12);
        assert_eq!(parse_key_name("RCTRL").unwrap(), Key::KEY_RIGHTCTRL);
    }

    #[test]
    fn test_parse_key_name_error() {
        assert!(parse_key_name("INVALID_KEY_NAME").is_err());
    }

    #[test]
    fn test_evdev_debug_names_normalize() {
        let release = KeyRelease::new(&format!("{:?}", Key::KEY_LEFTSHIFT), Instant::now());
        assert_eq!(release.key, "LEFTSHIFT");
        assert_eq!(release.ch, None);

        let release = KeyRelease::new(&format!("{:?}", Key::KEY_W), Instant::now());
        assert_eq!(release.ch, Some('w'));
    }
}

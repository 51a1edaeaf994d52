//! Plain-text activity log
//!
//! Transcripts, answers and task completions are appended to `texts.log`
//! as `<unix-seconds> <message>` lines, independent of the tracing output.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct ActivityLog {
    path: Option<PathBuf>,
    lock: Mutex<()>,
}

impl ActivityLog {
    /// `None` disables the log
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one entry; failures are logged and otherwise ignored
    pub fn record(&self, message: &str) {
        let Some(ref path) = self.path else {
            return;
        };

        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        // Keep one entry per line
        let message = message.replace('\n', " ");

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{} {}", secs, message));

        if let Err(e) = result {
            tracing::warn!("Failed to write activity log {:?}: {}", path, e);
        }
    }
}

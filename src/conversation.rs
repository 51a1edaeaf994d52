//! Voice chat transcripts on disk
//!
//! Each conversation is a plain text file. An exchange is appended as
//!
//! ```text
//!
//! #####
//! <user text>
//!
//! #####
//! <assistant text>
//! ```
//!
//! When reading back, blank lines are skipped and the role flips at every
//! `#####` line, starting from assistant, so the first block after the
//! first delimiter is the user's.

use crate::error::TaskError;
use crate::llm::{ChatMessage, Role};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const DELIMITER: &str = "#####";
const FILE_PREFIX: &str = "chat_";
const FILE_SUFFIX: &str = ".txt";

/// A conversation and the turns recorded so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub turns: Vec<ChatMessage>,
}

/// Persistence for voice chat history
pub trait ConversationStore: Send + Sync {
    /// Start an empty conversation
    fn create_new(&self) -> Result<Conversation, TaskError>;

    /// The most recently created conversation, if any
    fn load_most_recent(&self) -> Result<Option<Conversation>, TaskError>;

    /// Persist one turn and add it to `conversation`
    fn append_turn(
        &self,
        conversation: &mut Conversation,
        role: Role,
        text: &str,
    ) -> Result<(), TaskError>;
}

/// Conversations stored as `chat_<millis>.txt` files in one directory
pub struct FileConversationStore {
    dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", id, FILE_SUFFIX))
    }

    fn conversation_files(&self) -> Result<Vec<PathBuf>, TaskError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TaskError::Conversation(format!(
                    "cannot list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        Ok(entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect())
    }
}

fn conversation_error(path: &Path, e: std::io::Error) -> TaskError {
    TaskError::Conversation(format!("{}: {}", path.display(), e))
}

/// Creation time, falling back to modification time where the filesystem
/// does not record it
fn created_at(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

impl ConversationStore for FileConversationStore {
    fn create_new(&self) -> Result<Conversation, TaskError> {
        fs::create_dir_all(&self.dir).map_err(|e| conversation_error(&self.dir, e))?;

        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        // Two chats started in the same millisecond get distinct files
        loop {
            let id = format!("{}{}", FILE_PREFIX, millis);
            let path = self.path_for(&id);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    tracing::info!("Created conversation file {:?}", path);
                    return Ok(Conversation {
                        id,
                        turns: Vec::new(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => millis += 1,
                Err(e) => return Err(conversation_error(&path, e)),
            }
        }
    }

    fn load_most_recent(&self) -> Result<Option<Conversation>, TaskError> {
        let newest = self
            .conversation_files()?
            .into_iter()
            .max_by_key(|path| (created_at(path), path.clone()));

        let Some(path) = newest else {
            return Ok(None);
        };

        let contents = fs::read_to_string(&path).map_err(|e| conversation_error(&path, e))?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        tracing::info!("Continuing conversation {:?}", path);
        Ok(Some(Conversation {
            id,
            turns: parse_turns(&contents),
        }))
    }

    fn append_turn(
        &self,
        conversation: &mut Conversation,
        role: Role,
        text: &str,
    ) -> Result<(), TaskError> {
        let path = self.path_for(&conversation.id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| conversation_error(&path, e))?;

        write!(file, "\n{}\n{}\n", DELIMITER, text).map_err(|e| conversation_error(&path, e))?;

        conversation.turns.push(ChatMessage::new(role, text));
        Ok(())
    }
}

/// Rebuild the turns of a conversation file
pub fn parse_turns(contents: &str) -> Vec<ChatMessage> {
    let mut turns: Vec<ChatMessage> = Vec::new();
    let mut role = Role::Assistant;

    for line in contents.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if line == DELIMITER {
            role = match role {
                Role::Assistant => Role::User,
                _ => Role::Assistant,
            };
            continue;
        }

        match turns.last_mut() {
            Some(last) if last.role == role => {
                last.content.push('\n');
                last.content.push_str(line);
            }
            _ => turns.push(ChatMessage::new(role, line)),
        }
    }

    turns
}

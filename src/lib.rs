//! Chordvox: hotkey chords that record, transcribe and ask an LLM
//!
//! This library provides the core functionality for:
//! - Detecting a timed chord of trigger-key releases plus a task letter
//! - Recording the microphone through an external capture command
//! - Transcribing speech through a fallback chain of HTTP backends
//! - Writing, transforming the clipboard, or holding a spoken conversation
//! - Speaking answers through a fallback chain of speech engines
//!
//! # Architecture
//!
//! ```text
//!          ┌──────────────┐   key releases   ┌──────────────────┐
//!          │ KeyListener  │ ───────────────▶ │  TaskDispatcher  │
//!          │ (evdev/rdev) │                  │ KeyChordDetector │
//!          └──────────────┘                  └──────────────────┘
//!                                                     │ chord + letter
//!                                                     ▼
//!          ┌──────────────┐                  ┌──────────────────┐
//!          │  Dependency  │ ◀─── waits on ── │    TaskRunner    │
//!          │     Gate     │                  └──────────────────┘
//!          └──────────────┘                           │
//!                 │ loads                             ▼
//!                 ▼                 Recording → Transcribing → Acting
//!   credentials, transcription,              → Synthesizing → Persisting
//!        chat, speech
//! ```

pub mod activity;
pub mod audio;
pub mod chord;
pub mod cli;
pub mod config;
pub mod context;
pub mod conversation;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod hotkey;
pub mod llm;
pub mod notification;
pub mod output;
pub mod recording;
pub mod speech;
pub mod task;
pub mod transcribe;

pub use config::Config;
pub use error::{ChordvoxError, Result};

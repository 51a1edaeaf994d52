// Command-line interface definitions for chordvox
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chordvox")]
#[command(author, version, about = "Hotkey chords that record, transcribe and ask an LLM")]
#[command(long_about = "
Chordvox listens for a key chord and runs the task bound to the letter
pressed after it: write a transcript to the clipboard, transform the
clipboard by spoken instruction, or hold a spoken conversation.

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Put your API key in OPENAI_API_KEY (or OPENAI_API_KEY.txt in the config dir)
  4. Run: chordvox config --init (to write a starter config)
  5. Run: chordvox (to start listening)

USAGE:
  Tap Left Shift three times quickly, then press a task letter.
  Tap Left Shift once to finish recording, Escape to cancel.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override the chord trigger key (e.g., LEFTSHIFT, RIGHTCTRL, F13)
    #[arg(long, value_name = "KEY")]
    pub trigger_key: Option<String>,

    /// Number of trigger releases that form a chord
    #[arg(long, value_name = "N")]
    pub chord_count: Option<usize>,

    /// Seconds within which the chord must complete
    #[arg(long, value_name = "SECS")]
    pub chord_window: Option<f32>,

    /// Override the transcription language (e.g., en, de)
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Override the voice engine (piper, openai, deepgram, espeak, none)
    #[arg(long, value_name = "ENGINE")]
    pub voice_engine: Option<String>,

    /// Paste results into the focused window (Ctrl+V) instead of only copying
    #[arg(long)]
    pub auto_paste: bool,

    /// Transcribe with Deepgram instead of OpenAI
    #[arg(long)]
    pub deepgram_only: bool,

    /// Start with voice answers switched off
    #[arg(long)]
    pub no_voice: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Listen for chords (default if no command specified)
    Daemon,

    /// Run a single task now; the trigger key finishes recording
    Run {
        /// Task to run (write, transform_clipboard, new_voice_chat, continue_voice_chat)
        #[arg(long, value_name = "TASK")]
        task: String,

        /// LLM instruction applied to the transcript (write task)
        #[arg(long, value_name = "TEXT")]
        instruction: Option<String>,
    },

    /// Show current configuration
    Config {
        /// Write a commented starter config to the config path
        #[arg(long)]
        init: bool,
    },
}

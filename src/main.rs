//! Chordvox - hotkey chords that record, transcribe and ask an LLM
//!
//! Run with `chordvox` or `chordvox daemon` to start listening for chords.
//! Use `chordvox run --task <kind>` to run a single task right away.
//! Use `chordvox config` to show the effective configuration.

use anyhow::Context;
use chordvox::cli::{Cli, Commands};
use chordvox::config::{self, Config};
use chordvox::context::AppContext;
use chordvox::dispatch::{run_single_task, ListenerFactory, TaskDispatcher};
use chordvox::error::ChordvoxError;
use chordvox::hotkey;
use chordvox::task::binding::{resolve_bindings, TaskKind, TaskParams};
use chordvox::task::{TaskOutcome, TaskRequest};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// The operator cancelled the task
const EXIT_CANCELLED: u8 = 3;
/// The dispatcher gave up after repeated failures
const EXIT_FATAL: u8 = 4;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chordvox={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(key) = cli.trigger_key {
        config.hotkey.trigger_key = key;
    }
    if let Some(count) = cli.chord_count {
        config.hotkey.chord_count = count.max(1);
    }
    if let Some(window) = cli.chord_window {
        anyhow::ensure!(
            window.is_finite() && window > 0.0,
            "--chord-window must be a finite number greater than 0"
        );
        config.hotkey.chord_window_secs = window;
    }
    if let Some(language) = cli.language {
        config.transcription.language = language;
    }
    if let Some(engine) = cli.voice_engine {
        config.speech.engine = engine.parse().map_err(ChordvoxError::Config)?;
    }
    if cli.auto_paste {
        config.output.auto_paste = true;
    }
    if cli.deepgram_only {
        config.transcription.deepgram_only = true;
    }
    if cli.no_voice {
        config.speech.enabled = false;
    }

    // Run the appropriate command
    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(config).await,

        Commands::Run { task, instruction } => run_task(config, &task, instruction).await,

        Commands::Config { init } => {
            if init {
                init_config(cli.config.as_deref())?;
            } else {
                show_config(&config, cli.config.as_deref())?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Supervised chord listener
async fn run_daemon(config: Config) -> anyhow::Result<ExitCode> {
    config.ensure_directories()?;
    let bindings = resolve_bindings(&config.tasks)?;
    let hotkey_config = config.hotkey.clone();

    tracing::info!(
        "Starting chordvox daemon ({} task letters)",
        bindings.len()
    );

    let ctx = Arc::new(
        AppContext::from_config(config).context("Failed to start the dependency loader")?,
    );
    let listeners: ListenerFactory = Box::new(move || hotkey::create_listener(&hotkey_config));
    let dispatcher = TaskDispatcher::new(ctx, bindings, listeners);

    match dispatcher.run(shutdown_signal()).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e @ ChordvoxError::TooManyFailures(_)) => {
            tracing::error!("{}", e);
            Ok(ExitCode::from(EXIT_FATAL))
        }
        Err(e) => Err(e.into()),
    }
}

/// One-shot task, finished with the trigger key
async fn run_task(
    config: Config,
    task: &str,
    instruction: Option<String>,
) -> anyhow::Result<ExitCode> {
    config.ensure_directories()?;
    let kind: TaskKind = task.parse().map_err(ChordvoxError::Config)?;
    let request = TaskRequest {
        kind,
        params: TaskParams {
            instruction,
            ..Default::default()
        },
    };

    let listener = hotkey::create_listener(&config.hotkey)?;
    let ctx = Arc::new(
        AppContext::from_config(config).context("Failed to start the dependency loader")?,
    );

    let result = tokio::select! {
        result = run_single_task(ctx, request, listener) => result,
        _ = shutdown_signal() => return Ok(ExitCode::from(EXIT_CANCELLED)),
    };

    match result {
        Ok(TaskOutcome::Completed) => Ok(ExitCode::SUCCESS),
        Ok(TaskOutcome::Cancelled) => Ok(ExitCode::from(EXIT_CANCELLED)),
        Err(ChordvoxError::Task(e)) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received Ctrl+C, shutting down...");
    }
}

fn config_path(explicit: Option<&Path>) -> anyhow::Result<std::path::PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(Config::default_path)
        .context("Could not determine the config directory")
}

/// Write the commented default config, leaving an existing file alone
fn init_config(explicit: Option<&Path>) -> anyhow::Result<()> {
    let path = config_path(explicit)?;
    if path.exists() {
        anyhow::bail!("Config file already exists: {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, config::DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("Wrote default configuration to {:?}", path);
    Ok(())
}

fn show_config(config: &Config, explicit: Option<&Path>) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");
    println!("{}", toml::to_string_pretty(config)?);

    println!("---");
    match config_path(explicit) {
        Ok(path) if path.exists() => println!("Config file: {:?}", path),
        Ok(path) => println!("Config file: {:?} (not found, using defaults)", path),
        Err(_) => println!("Config file: (not found)"),
    }
    println!("API key directory: {:?}", config.api_key_dir());
    println!("Conversations: {:?}", config.conversation_dir());
    println!("Activity log: {:?}", Config::activity_log_path());
    Ok(())
}

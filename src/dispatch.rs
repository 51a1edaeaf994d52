//! Chord supervisor
//!
//! Owns the key listener and the chord detector, turns recognized chords
//! into task runs, and routes the trigger and cancel keys to the running
//! task. Task runs execute on their own tokio tasks and report back over a
//! channel, so a failing or panicking task never takes the loop down.
//!
//! Listener deaths and backend failures are counted. A successful task, or
//! a restarted listener delivering its first key event, resets the count;
//! reaching [`MAX_CONSECUTIVE_FAILURES`] ends the loop with
//! [`ChordvoxError::TooManyFailures`].

use crate::chord::{ChordConfig, ChordOutcome, KeyChordDetector};
use crate::context::AppContext;
use crate::error::{ChordvoxError, HotkeyError, TaskError};
use crate::hotkey::{normalize_key_name, KeyListener, KeyRelease};
use crate::notification;
use crate::task::binding::{Bindings, TaskBinding, TaskKind, ToggleAction};
use crate::task::{StopSignal, TaskOutcome, TaskRequest, TaskRunner};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Creates a fresh key listener for each (re)start
pub type ListenerFactory =
    Box<dyn FnMut() -> Result<Box<dyn KeyListener>, HotkeyError> + Send>;

struct TaskReport {
    kind: TaskKind,
    result: Result<TaskOutcome, TaskError>,
}

pub struct TaskDispatcher {
    ctx: Arc<AppContext>,
    runner: TaskRunner,
    bindings: Arc<Bindings>,
    chord: ChordConfig,
    cancel_key: String,
    listeners: ListenerFactory,
    failures: u32,
    restart_delay: Duration,
    /// Stop channel of the task that is still recording
    active_stop: Option<oneshot::Sender<StopSignal>>,
    /// A task run has not reported back yet
    busy: bool,
}

impl TaskDispatcher {
    pub fn new(ctx: Arc<AppContext>, bindings: Bindings, listeners: ListenerFactory) -> Self {
        let hotkey = &ctx.config.hotkey;
        let chord = ChordConfig::new(
            &hotkey.trigger_key,
            hotkey.chord_count,
            hotkey.chord_window_secs,
        );
        let cancel_key = normalize_key_name(&hotkey.cancel_key);

        Self {
            runner: TaskRunner::new(ctx.clone()),
            ctx,
            bindings: Arc::new(bindings),
            chord,
            cancel_key,
            listeners,
            failures: 0,
            restart_delay: Duration::from_secs(1),
            active_stop: None,
            busy: false,
        }
    }

    /// Pause between a listener failure and its restart
    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Run until `shutdown` resolves or too many consecutive failures
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ChordvoxError> {
        tokio::pin!(shutdown);
        let (report_tx, mut report_rx) = mpsc::channel::<TaskReport>(8);

        tracing::info!(
            "Chord: {} x{} within {:.1}s, cancel with {}",
            self.chord.trigger_key,
            self.chord.required_count,
            self.chord.window.as_secs_f32(),
            self.cancel_key
        );

        'listener: loop {
            let mut listener = match (self.listeners)() {
                Ok(listener) => listener,
                Err(e) => {
                    self.listener_failed(&e.to_string()).await?;
                    tokio::time::sleep(self.restart_delay).await;
                    continue;
                }
            };

            let mut key_rx = match listener.start().await {
                Ok(rx) => rx,
                Err(e) => {
                    self.listener_failed(&e.to_string()).await?;
                    tokio::time::sleep(self.restart_delay).await;
                    continue;
                }
            };

            let mut detector = KeyChordDetector::new(self.chord.clone(), self.bindings.clone());
            let mut delivered = false;
            tracing::info!("Listening for chords");

            loop {
                tokio::select! {
                    _ = &mut shutdown => {
                        tracing::info!("Shutting down dispatcher");
                        if let Err(e) = listener.stop().await {
                            tracing::warn!("Failed to stop key listener: {}", e);
                        }
                        break 'listener;
                    }

                    Some(report) = report_rx.recv() => {
                        self.handle_report(report, &mut detector).await?;
                    }

                    event = key_rx.recv() => match event {
                        Some(event) => {
                            if !delivered {
                                delivered = true;
                                if self.failures > 0 {
                                    tracing::info!("Key listener recovered, clearing failure count");
                                    self.failures = 0;
                                }
                            }
                            self.handle_key(&event, &mut detector, &report_tx).await
                        }
                        None => {
                            // Listener died; stop a recording nobody can finish
                            if let Some(stop) = self.active_stop.take() {
                                let _ = stop.send(StopSignal::Cancel);
                            }
                            if let Err(e) = listener.stop().await {
                                tracing::debug!("Stopping dead listener: {}", e);
                            }
                            self.listener_failed("key event stream closed").await?;
                            tokio::time::sleep(self.restart_delay).await;
                            continue 'listener;
                        }
                    }
                }
            }
        }

        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    async fn handle_key(
        &mut self,
        event: &KeyRelease,
        detector: &mut KeyChordDetector,
        reports: &mpsc::Sender<TaskReport>,
    ) {
        if self.busy {
            let signal = if event.key == self.chord.trigger_key {
                StopSignal::Finish
            } else if event.key == self.cancel_key {
                StopSignal::Cancel
            } else {
                return;
            };
            if let Some(stop) = self.active_stop.take() {
                tracing::debug!("{} released, sending {:?}", event.key, signal);
                let _ = stop.send(signal);
            }
            return;
        }

        match detector.on_release(event) {
            ChordOutcome::Counting(count) => {
                tracing::debug!("Trigger released ({}/{})", count, self.chord.required_count)
            }
            ChordOutcome::ChordRecognized => tracing::debug!("Chord recognized"),
            ChordOutcome::Dispatch { letter, binding } => {
                tracing::info!("Task letter '{}'", letter);
                self.dispatch(binding, reports).await;
            }
            ChordOutcome::UnexpectedKey(letter) => {
                let error = TaskError::ChordBindingInvalid(letter);
                tracing::warn!("{}", error);
                self.ctx
                    .notifier
                    .notify(&error.to_string(), notification::SHORT)
                    .await;
            }
            ChordOutcome::Reset | ChordOutcome::Ignored => {}
        }
    }

    async fn dispatch(&mut self, binding: TaskBinding, reports: &mpsc::Sender<TaskReport>) {
        match binding {
            TaskBinding::Toggle(ToggleAction::Voice) => {
                let enabled = self.ctx.flags.toggle_voice();
                let message = if enabled { "Voice on" } else { "Voice off" };
                tracing::info!("{}", message);
                self.ctx.notifier.notify(message, notification::SHORT).await;
            }
            TaskBinding::Task { kind, params } => {
                let (stop_tx, stop_rx) = oneshot::channel();
                self.active_stop = Some(stop_tx);
                self.busy = true;

                let runner = self.runner.clone();
                let reports = reports.clone();
                let request = TaskRequest { kind, params };

                tokio::spawn(async move {
                    // Inner task so a panic surfaces as a JoinError
                    let run = tokio::spawn(async move { runner.run(&request, stop_rx).await });
                    let result = match run.await {
                        Ok(result) => result,
                        Err(e) => Err(TaskError::Worker(format!("task panicked: {}", e))),
                    };
                    let _ = reports.send(TaskReport { kind, result }).await;
                });
            }
        }
    }

    async fn handle_report(
        &mut self,
        report: TaskReport,
        detector: &mut KeyChordDetector,
    ) -> Result<(), ChordvoxError> {
        self.busy = false;
        self.active_stop = None;

        match report.result {
            Ok(_) => {
                self.failures = 0;
                Ok(())
            }
            Err(e) if e.is_user_error() => {
                tracing::info!("Task {} not run: {}", report.kind, e);
                self.ctx
                    .notifier
                    .notify(&e.to_string(), notification::SHORT)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.ctx
                    .notifier
                    .notify(
                        &format!("Task {} failed: {}", report.kind, e),
                        notification::LONG,
                    )
                    .await;
                detector.reset();
                self.record_failure(&e.to_string())
            }
        }
    }

    async fn listener_failed(&mut self, reason: &str) -> Result<(), ChordvoxError> {
        tracing::error!("Key listener failed: {}", reason);
        self.ctx
            .notifier
            .notify(
                &format!("Key listener failed: {}", reason),
                notification::SHORT,
            )
            .await;
        self.record_failure(reason)
    }

    fn record_failure(&mut self, reason: &str) -> Result<(), ChordvoxError> {
        self.failures += 1;
        tracing::error!(
            "Failure {}/{}: {}",
            self.failures,
            MAX_CONSECUTIVE_FAILURES,
            reason
        );
        if self.failures >= MAX_CONSECUTIVE_FAILURES {
            return Err(ChordvoxError::TooManyFailures(self.failures));
        }
        Ok(())
    }
}

/// Run one task outside the chord loop
///
/// The trigger key finishes the recording and the cancel key aborts it.
pub async fn run_single_task(
    ctx: Arc<AppContext>,
    request: TaskRequest,
    mut listener: Box<dyn KeyListener>,
) -> Result<TaskOutcome, ChordvoxError> {
    let mut key_rx = listener.start().await?;
    let trigger = normalize_key_name(&ctx.config.hotkey.trigger_key);
    let cancel = normalize_key_name(&ctx.config.hotkey.cancel_key);

    let (stop_tx, stop_rx) = oneshot::channel();
    let mut stop_tx = Some(stop_tx);

    let runner = TaskRunner::new(ctx.clone());
    let task = runner.run(&request, stop_rx);
    tokio::pin!(task);

    let result = loop {
        tokio::select! {
            result = &mut task => break result,

            event = key_rx.recv(), if stop_tx.is_some() => {
                let signal = match event {
                    Some(event) if event.key == trigger => StopSignal::Finish,
                    Some(event) if event.key == cancel => StopSignal::Cancel,
                    Some(_) => continue,
                    None => {
                        tracing::warn!("Key listener stopped during the task");
                        StopSignal::Cancel
                    }
                };
                if let Some(stop) = stop_tx.take() {
                    let _ = stop.send(signal);
                }
            }
        }
    };

    if let Err(e) = listener.stop().await {
        tracing::warn!("Failed to stop key listener: {}", e);
    }

    if let Err(ref e) = result {
        ctx.notifier
            .notify(&format!("Task {} failed: {}", request.kind, e), notification::LONG)
            .await;
    }
    result.map_err(ChordvoxError::from)
}

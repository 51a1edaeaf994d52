//! Chord detection state machine
//!
//! Recognizes "release the trigger key N times within W seconds", then
//! waits for a single task letter. The detector is pure: it is fed key
//! releases with their timestamps and returns what happened, so it can be
//! driven by a listener or by tests with synthetic clocks.
//!
//! ```text
//!  Idle ──trigger──▶ Counting ──trigger (N within W)──▶ AwaitingLetter
//!   ▲                   │                                     │
//!   └────other key──────┘◀──letter / modifier / expiry────────┘
//! ```

use crate::hotkey::{normalize_key_name, KeyRelease};
use crate::task::binding::{Bindings, TaskBinding};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Chord size and timing
#[derive(Debug, Clone)]
pub struct ChordConfig {
    /// Normalized trigger key name
    pub trigger_key: String,
    pub required_count: usize,
    pub window: Duration,
}

impl ChordConfig {
    pub fn new(trigger_key: &str, required_count: usize, window_secs: f32) -> Self {
        Self {
            trigger_key: normalize_key_name(trigger_key),
            required_count: required_count.max(1),
            window: Duration::from_secs_f32(window_secs.max(0.0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordState {
    Idle,
    Counting,
    /// Chord recognized at the given instant, waiting for a task letter
    AwaitingLetter { since: Instant },
}

/// Result of feeding one key release
#[derive(Debug, Clone, PartialEq)]
pub enum ChordOutcome {
    /// Trigger release counted; value is the number inside the window
    Counting(usize),
    /// Chord complete, now waiting for a letter
    ChordRecognized,
    /// A bound letter was pressed
    Dispatch { letter: char, binding: TaskBinding },
    /// A letter with no binding was pressed
    UnexpectedKey(char),
    /// Pending chord or letter selection abandoned
    Reset,
    /// Nothing to do
    Ignored,
}

pub struct KeyChordDetector {
    config: ChordConfig,
    bindings: Arc<Bindings>,
    presses: VecDeque<Instant>,
    state: ChordState,
}

impl KeyChordDetector {
    pub fn new(config: ChordConfig, bindings: Arc<Bindings>) -> Self {
        Self {
            config,
            bindings,
            presses: VecDeque::new(),
            state: ChordState::Idle,
        }
    }

    pub fn state(&self) -> ChordState {
        self.state
    }

    pub fn reset(&mut self) {
        self.presses.clear();
        self.state = ChordState::Idle;
    }

    pub fn on_release(&mut self, event: &KeyRelease) -> ChordOutcome {
        if let ChordState::AwaitingLetter { since } = self.state {
            if event.at.saturating_duration_since(since) <= self.config.window {
                return self.select_letter(event);
            }
            tracing::debug!("Letter selection expired");
            self.reset();
        }

        if event.key == self.config.trigger_key {
            return self.count_trigger(event.at);
        }

        if self.state == ChordState::Counting {
            tracing::debug!("Chord interrupted by {}", event.key);
            self.reset();
            return ChordOutcome::Reset;
        }

        ChordOutcome::Ignored
    }

    fn count_trigger(&mut self, at: Instant) -> ChordOutcome {
        self.presses.push_back(at);
        let window = self.config.window;
        self.presses
            .retain(|pressed| at.saturating_duration_since(*pressed) <= window);

        if self.presses.len() >= self.config.required_count {
            tracing::debug!("Chord recognized, waiting for a task letter");
            self.presses.clear();
            self.state = ChordState::AwaitingLetter { since: at };
            ChordOutcome::ChordRecognized
        } else {
            self.state = ChordState::Counting;
            ChordOutcome::Counting(self.presses.len())
        }
    }

    fn select_letter(&mut self, event: &KeyRelease) -> ChordOutcome {
        // Another trigger release keeps the pending selection
        if event.key == self.config.trigger_key {
            return ChordOutcome::Ignored;
        }

        self.reset();

        let Some(letter) = event.ch.map(|c| c.to_ascii_lowercase()) else {
            return ChordOutcome::Reset;
        };

        match self.bindings.get(&letter) {
            Some(binding) => {
                tracing::debug!("Task letter '{}' selected", letter);
                ChordOutcome::Dispatch {
                    letter,
                    binding: binding.clone(),
                }
            }
            None => {
                tracing::debug!("Unexpected key '{}'", letter);
                ChordOutcome::UnexpectedKey(letter)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::binding::{TaskKind, TaskParams, ToggleAction};

    fn bindings() -> Arc<Bindings> {
        let mut bindings = Bindings::new();
        bindings.insert(
            'w',
            TaskBinding::Task {
                kind: TaskKind::Write,
                params: TaskParams::default(),
            },
        );
        bindings.insert('v', TaskBinding::Toggle(ToggleAction::Voice));
        Arc::new(bindings)
    }

    fn detector() -> KeyChordDetector {
        KeyChordDetector::new(ChordConfig::new("LEFTSHIFT", 3, 2.0), bindings())
    }

    fn at(base: Instant, secs: f32) -> Instant {
        base + Duration::from_secs_f32(secs)
    }

    fn shift(base: Instant, secs: f32) -> KeyRelease {
        KeyRelease::new("LEFTSHIFT", at(base, secs))
    }

    fn key(base: Instant, name: &str, secs: f32) -> KeyRelease {
        KeyRelease::new(name, at(base, secs))
    }

    #[test]
    fn test_three_releases_recognize_chord() {
        let t0 = Instant::now();
        let mut d = detector();
        assert_eq!(d.on_release(&shift(t0, 0.0)), ChordOutcome::Counting(1));
        assert_eq!(d.on_release(&shift(t0, 0.5)), ChordOutcome::Counting(2));
        assert_eq!(d.on_release(&shift(t0, 1.0)), ChordOutcome::ChordRecognized);
        assert!(matches!(d.state(), ChordState::AwaitingLetter { .. }));

        match d.on_release(&key(t0, "W", 1.5)) {
            ChordOutcome::Dispatch { letter, binding } => {
                assert_eq!(letter, 'w');
                assert!(matches!(
                    binding,
                    TaskBinding::Task {
                        kind: TaskKind::Write,
                        ..
                    }
                ));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(d.state(), ChordState::Idle);
    }

    #[test]
    fn test_slow_releases_are_purged() {
        let t0 = Instant::now();
        let mut d = detector();
        d.on_release(&shift(t0, 0.0));
        d.on_release(&shift(t0, 1.5));
        // The first release is now 2.5s old and drops out of the window
        assert_eq!(d.on_release(&shift(t0, 2.5)), ChordOutcome::Counting(2));
        assert_eq!(d.on_release(&shift(t0, 3.0)), ChordOutcome::ChordRecognized);
    }

    #[test]
    fn test_span_equal_to_window_counts() {
        let t0 = Instant::now();
        let mut d = detector();
        d.on_release(&shift(t0, 0.0));
        d.on_release(&shift(t0, 1.0));
        assert_eq!(d.on_release(&shift(t0, 2.0)), ChordOutcome::ChordRecognized);
    }

    #[test]
    fn test_other_key_clears_count() {
        let t0 = Instant::now();
        let mut d = detector();
        d.on_release(&shift(t0, 0.0));
        d.on_release(&shift(t0, 0.2));
        assert_eq!(d.on_release(&key(t0, "A", 0.3)), ChordOutcome::Reset);
        assert_eq!(d.state(), ChordState::Idle);
        assert_eq!(d.on_release(&shift(t0, 0.4)), ChordOutcome::Counting(1));
    }

    #[test]
    fn test_unbound_letter_returns_to_idle() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.1, 0.2] {
            d.on_release(&shift(t0, t));
        }
        assert_eq!(d.on_release(&key(t0, "Q", 0.5)), ChordOutcome::UnexpectedKey('q'));
        assert_eq!(d.state(), ChordState::Idle);
    }

    #[test]
    fn test_modifier_while_awaiting_resets_without_dispatch() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.1, 0.2] {
            d.on_release(&shift(t0, t));
        }
        assert_eq!(d.on_release(&key(t0, "LEFTCTRL", 0.3)), ChordOutcome::Reset);
        assert_eq!(d.state(), ChordState::Idle);
        assert_eq!(d.on_release(&key(t0, "W", 0.4)), ChordOutcome::Ignored);
    }

    #[test]
    fn test_trigger_while_awaiting_keeps_selection() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.1, 0.2] {
            d.on_release(&shift(t0, t));
        }
        assert_eq!(d.on_release(&shift(t0, 0.3)), ChordOutcome::Ignored);
        assert!(matches!(d.state(), ChordState::AwaitingLetter { .. }));
        assert!(matches!(
            d.on_release(&key(t0, "V", 0.4)),
            ChordOutcome::Dispatch { letter: 'v', .. }
        ));
    }

    #[test]
    fn test_letter_after_window_is_silently_dropped() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.5, 1.0] {
            d.on_release(&shift(t0, t));
        }
        assert_eq!(d.on_release(&key(t0, "W", 3.5)), ChordOutcome::Ignored);
        assert_eq!(d.state(), ChordState::Idle);
    }

    #[test]
    fn test_trigger_after_expiry_starts_new_count() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.5, 1.0] {
            d.on_release(&shift(t0, t));
        }
        assert_eq!(d.on_release(&shift(t0, 5.0)), ChordOutcome::Counting(1));
    }

    #[test]
    fn test_uppercase_letter_matches_binding() {
        let t0 = Instant::now();
        let mut d = detector();
        for t in [0.0, 0.1, 0.2] {
            d.on_release(&shift(t0, t));
        }
        let event = KeyRelease {
            key: "W".into(),
            ch: Some('W'),
            at: at(t0, 0.3),
        };
        assert!(matches!(
            d.on_release(&event),
            ChordOutcome::Dispatch { letter: 'w', .. }
        ));
    }

    #[test]
    fn test_single_press_chord() {
        let t0 = Instant::now();
        let mut d = KeyChordDetector::new(ChordConfig::new("RIGHTCTRL", 1, 1.0), bindings());
        assert_eq!(
            d.on_release(&key(t0, "RCTRL", 0.0)),
            ChordOutcome::ChordRecognized
        );
    }
}

//! Cart countdown state machine
//!
//! `TimerState` is the single source of truth for the cart countdown. Every
//! transition takes the current wall-clock time explicitly so the machine
//! stays deterministic; the caller is responsible for mirroring the result
//! to the persistence bridge.

use serde::{Deserialize, Serialize};

use super::persistence::PersistedTimer;

/// Full countdown length used when none is configured
pub const DEFAULT_DURATION_SECONDS: u64 = 90;
/// Remaining time at which the low-time warning is raised
pub const DEFAULT_WARNING_THRESHOLD_SECONDS: u64 = 30;

/// Lifecycle of the cart countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Active,
    Paused,
    Expired,
}

/// Result of a single one-second tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer was not counting down, nothing changed
    Skipped,
    Counting { remaining: u64 },
    /// Remaining time just crossed the warning threshold
    Warning { remaining: u64 },
    /// Countdown reached zero; the expiration sequence must run
    Expired,
}

/// Countdown state for the active cart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    status: TimerStatus,
    remaining_seconds: Option<u64>,
    warning_fired: bool,
    started_at_epoch_millis: Option<i64>,
    duration_seconds: u64,
    warning_threshold_seconds: u64,
}

impl TimerState {
    /// Create an idle timer with the given window
    pub fn new(duration_seconds: u64, warning_threshold_seconds: u64) -> Self {
        Self {
            status: TimerStatus::Idle,
            remaining_seconds: None,
            warning_fired: false,
            started_at_epoch_millis: None,
            duration_seconds,
            warning_threshold_seconds,
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn remaining_seconds(&self) -> Option<u64> {
        self.remaining_seconds
    }

    pub fn warning_fired(&self) -> bool {
        self.warning_fired
    }

    pub fn started_at_epoch_millis(&self) -> Option<i64> {
        self.started_at_epoch_millis
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn warning_threshold_seconds(&self) -> u64 {
        self.warning_threshold_seconds
    }

    /// Active or paused, i.e. a countdown window exists
    pub fn is_running(&self) -> bool {
        matches!(self.status, TimerStatus::Active | TimerStatus::Paused)
    }

    /// Start a fresh countdown. Rejected while the cart is empty or a
    /// countdown is already running.
    pub fn start(&mut self, now_millis: i64, cart_len: usize) -> bool {
        if cart_len == 0 || self.is_running() {
            return false;
        }
        self.status = TimerStatus::Active;
        self.reset_window(now_millis);
        true
    }

    /// Reset the countdown to the full duration. Not additive.
    pub fn extend(&mut self, now_millis: i64) -> bool {
        if !self.is_running() {
            return false;
        }
        self.reset_window(now_millis);
        true
    }

    /// Freeze the countdown, keeping the remaining time as a snapshot
    pub fn pause(&mut self) -> bool {
        if self.status != TimerStatus::Active {
            return false;
        }
        self.status = TimerStatus::Paused;
        true
    }

    /// Continue from the paused snapshot
    pub fn resume(&mut self, now_millis: i64) -> bool {
        if self.status != TimerStatus::Paused {
            return false;
        }
        let remaining = self.remaining_seconds.unwrap_or(self.duration_seconds);
        self.status = TimerStatus::Active;
        self.started_at_epoch_millis = Some(self.anchor_for(remaining, now_millis));
        true
    }

    /// Drop the countdown entirely. Returns whether anything changed.
    pub fn stop(&mut self) -> bool {
        let changed = self.status != TimerStatus::Idle;
        self.status = TimerStatus::Idle;
        self.remaining_seconds = None;
        self.warning_fired = false;
        self.started_at_epoch_millis = None;
        changed
    }

    /// Advance the countdown by one second
    pub fn tick(&mut self) -> TickOutcome {
        if self.status != TimerStatus::Active {
            return TickOutcome::Skipped;
        }

        let remaining = self.remaining_seconds.unwrap_or(0).saturating_sub(1);
        self.remaining_seconds = Some(remaining);

        if remaining == 0 {
            self.status = TimerStatus::Expired;
            return TickOutcome::Expired;
        }

        if !self.warning_fired && remaining <= self.warning_threshold_seconds {
            self.warning_fired = true;
            return TickOutcome::Warning { remaining };
        }

        TickOutcome::Counting { remaining }
    }

    /// Mark the countdown as expired without ticking (recovery path)
    pub fn expire(&mut self) {
        self.status = TimerStatus::Expired;
        self.remaining_seconds = Some(0);
    }

    /// Resume a live countdown recovered from storage
    pub fn restore_active(&mut self, remaining: u64, now_millis: i64) {
        self.status = TimerStatus::Active;
        self.remaining_seconds = Some(remaining);
        self.warning_fired = false;
        self.started_at_epoch_millis = Some(self.anchor_for(remaining, now_millis));
    }

    /// Restore a countdown that was paused when it was persisted
    pub fn restore_paused(&mut self, remaining: u64, started_at_millis: Option<i64>, now_millis: i64) {
        self.status = TimerStatus::Paused;
        self.remaining_seconds = Some(remaining);
        self.warning_fired = false;
        self.started_at_epoch_millis =
            Some(started_at_millis.unwrap_or_else(|| self.anchor_for(remaining, now_millis)));
    }

    /// The durable form of this state, or `None` when nothing should be kept
    pub fn persisted(&self) -> Option<PersistedTimer> {
        let started_at = self.started_at_epoch_millis?;
        match self.status {
            TimerStatus::Active => Some(PersistedTimer {
                started_at: Some(started_at),
                duration_seconds: Some(self.duration_seconds),
                paused: false,
                paused_remaining: None,
            }),
            TimerStatus::Paused => Some(PersistedTimer {
                started_at: Some(started_at),
                duration_seconds: Some(self.duration_seconds),
                paused: true,
                paused_remaining: self.remaining_seconds,
            }),
            TimerStatus::Idle | TimerStatus::Expired => None,
        }
    }

    fn reset_window(&mut self, now_millis: i64) {
        self.remaining_seconds = Some(self.duration_seconds);
        self.started_at_epoch_millis = Some(now_millis);
        self.warning_fired = false;
    }

    // Anchor such that `duration - elapsed == remaining` at `now_millis`.
    fn anchor_for(&self, remaining: u64, now_millis: i64) -> i64 {
        let elapsed = self.duration_seconds.saturating_sub(remaining);
        now_millis - (elapsed as i64) * 1000
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION_SECONDS, DEFAULT_WARNING_THRESHOLD_SECONDS)
    }
}

/// Render seconds as `m:ss` for user-facing messages
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000_000;

    fn active() -> TimerState {
        let mut state = TimerState::default();
        assert!(state.start(NOW, 1));
        state
    }

    #[test]
    fn start_is_rejected_for_empty_cart() {
        let mut state = TimerState::default();
        assert!(!state.start(NOW, 0));
        assert_eq!(state.status(), TimerStatus::Idle);
        assert_eq!(state.remaining_seconds(), None);
    }

    #[test]
    fn start_sets_full_duration_and_anchor() {
        let state = active();
        assert_eq!(state.status(), TimerStatus::Active);
        assert_eq!(state.remaining_seconds(), Some(90));
        assert_eq!(state.started_at_epoch_millis(), Some(NOW));
        assert!(!state.warning_fired());
    }

    #[test]
    fn start_does_not_restart_a_running_timer() {
        let mut state = active();
        state.tick();
        assert!(!state.start(NOW + 5_000, 2));
        assert_eq!(state.remaining_seconds(), Some(89));
    }

    #[test]
    fn extend_is_a_full_reset_not_additive() {
        let mut state = active();
        for _ in 0..70 {
            state.tick();
        }
        assert!(state.warning_fired());
        assert!(state.extend(NOW + 70_000));
        assert!(state.extend(NOW + 70_500));
        assert_eq!(state.remaining_seconds(), Some(90));
        assert!(!state.warning_fired());
        assert_eq!(state.started_at_epoch_millis(), Some(NOW + 70_500));
    }

    #[test]
    fn extend_requires_running_timer() {
        let mut state = TimerState::default();
        assert!(!state.extend(NOW));
        assert_eq!(state.status(), TimerStatus::Idle);
    }

    #[test]
    fn extend_while_paused_keeps_pause() {
        let mut state = active();
        state.tick();
        state.pause();
        assert!(state.extend(NOW + 1_000));
        assert_eq!(state.status(), TimerStatus::Paused);
        assert_eq!(state.remaining_seconds(), Some(90));
    }

    #[test]
    fn pause_twice_is_a_noop() {
        let mut state = active();
        assert!(state.pause());
        let snapshot = state.clone();
        assert!(!state.pause());
        assert_eq!(state, snapshot);
    }

    #[test]
    fn paused_timer_does_not_tick() {
        let mut state = active();
        state.tick();
        state.pause();
        for _ in 0..5 {
            assert_eq!(state.tick(), TickOutcome::Skipped);
        }
        assert_eq!(state.remaining_seconds(), Some(89));
        assert!(state.resume(NOW + 6_000));
        assert_eq!(state.remaining_seconds(), Some(89));
        assert_eq!(state.started_at_epoch_millis(), Some(NOW + 6_000 - 1_000));
    }

    #[test]
    fn resume_requires_pause() {
        let mut state = active();
        assert!(!state.resume(NOW));
    }

    #[test]
    fn warning_fires_once_at_threshold() {
        let mut state = TimerState::default();
        state.restore_active(31, NOW);
        assert_eq!(state.tick(), TickOutcome::Warning { remaining: 30 });
        assert!(state.warning_fired());
        assert_eq!(state.tick(), TickOutcome::Counting { remaining: 29 });
    }

    #[test]
    fn countdown_expires_at_zero() {
        let mut state = TimerState::default();
        state.restore_active(1, NOW);
        assert_eq!(state.tick(), TickOutcome::Expired);
        assert_eq!(state.status(), TimerStatus::Expired);
        assert_eq!(state.remaining_seconds(), Some(0));
        assert_eq!(state.tick(), TickOutcome::Skipped);
    }

    #[test]
    fn expired_timer_can_start_again() {
        let mut state = TimerState::default();
        state.restore_active(1, NOW);
        state.tick();
        assert!(state.start(NOW + 10_000, 1));
        assert_eq!(state.remaining_seconds(), Some(90));
    }

    #[test]
    fn stop_clears_everything() {
        let mut state = active();
        assert!(state.stop());
        assert_eq!(state, TimerState::default());
        assert!(!state.stop());
    }

    #[test]
    fn persisted_form_tracks_status() {
        let mut state = active();
        let saved = state.persisted().expect("active timer persists");
        assert!(!saved.paused);
        assert_eq!(saved.started_at, Some(NOW));

        state.tick();
        state.pause();
        let saved = state.persisted().expect("paused timer persists");
        assert!(saved.paused);
        assert_eq!(saved.paused_remaining, Some(89));

        state.stop();
        assert!(state.persisted().is_none());
    }

    #[test]
    fn formats_clock() {
        assert_eq!(format_clock(90), "1:30");
        assert_eq!(format_clock(5), "0:05");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start(usize),
        Extend,
        Pause,
        Resume,
        Stop,
        Tick,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3).prop_map(Op::Start),
            Just(Op::Extend),
            Just(Op::Pause),
            Just(Op::Resume),
            Just(Op::Stop),
            Just(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn remaining_is_none_exactly_when_idle(ops in proptest::collection::vec(op(), 0..200)) {
            let mut state = TimerState::new(5, 2);
            let mut now = NOW;
            for op in ops {
                now += 1_000;
                match op {
                    Op::Start(len) => { state.start(now, len); }
                    Op::Extend => { state.extend(now); }
                    Op::Pause => { state.pause(); }
                    Op::Resume => { state.resume(now); }
                    Op::Stop => { state.stop(); }
                    Op::Tick => { state.tick(); }
                }
                let idle = state.status() == TimerStatus::Idle;
                prop_assert_eq!(idle, state.remaining_seconds().is_none());
                if let Some(remaining) = state.remaining_seconds() {
                    prop_assert!(remaining <= state.duration_seconds());
                }
                if state.status() == TimerStatus::Active {
                    prop_assert!(state.started_at_epoch_millis().is_some());
                }
            }
        }
    }
}

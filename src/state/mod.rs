//! State management module
//!
//! This module contains the countdown state machine, its persistence bridge
//! and the shared application state that drives both.

pub mod app_state;
pub mod persistence;
pub mod timer_state;

// Re-export main types
pub use app_state::{AppState, RecoveryOutcome, TimerEvent, TimerSettings};
pub use persistence::{FileTimerStore, MemoryTimerStore, PersistedTimer, Recovered, StoreError, TimerStore};
pub use timer_state::{format_clock, TickOutcome, TimerState, TimerStatus};

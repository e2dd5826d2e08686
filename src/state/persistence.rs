//! Durable mirror of the cart countdown
//!
//! The countdown is persisted as four keys (start anchor, duration, paused
//! flag, paused snapshot) so a restart can recompute the remaining time from
//! the wall clock instead of trusting a suspended in-process timer.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised by a timer store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("timer store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timer store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("timer store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted countdown keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimer {
    pub started_at: Option<i64>,
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub paused: bool,
    pub paused_remaining: Option<u64>,
}

/// What a persisted record means at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovered {
    /// No usable countdown was stored
    Nothing,
    Paused { remaining: u64, started_at: Option<i64> },
    Active { remaining: u64 },
    /// The window elapsed while the process was down
    Expired,
}

impl PersistedTimer {
    /// Interpret the stored keys at `now_millis`
    pub fn recover(&self, now_millis: i64, fallback_duration: u64) -> Recovered {
        if self.paused {
            if let Some(remaining) = self.paused_remaining {
                if remaining == 0 {
                    return Recovered::Expired;
                }
                return Recovered::Paused {
                    remaining,
                    started_at: self.started_at,
                };
            }
        }

        let Some(started_at) = self.started_at else {
            return Recovered::Nothing;
        };
        let duration = self.duration_seconds.unwrap_or(fallback_duration);
        match remaining_after(duration, started_at, now_millis) {
            0 => Recovered::Expired,
            remaining => Recovered::Active { remaining },
        }
    }
}

/// `duration - floor((now - started_at) / 1000)`, clamped to `[0, duration]`
pub fn remaining_after(duration_seconds: u64, started_at_millis: i64, now_millis: i64) -> u64 {
    let elapsed_secs = now_millis.saturating_sub(started_at_millis).max(0) / 1000;
    duration_seconds.saturating_sub(elapsed_secs as u64)
}

/// Persistence bridge for the countdown
pub trait TimerStore: Send + Sync {
    fn save(&self, timer: &PersistedTimer) -> StoreResult<()>;
    fn load(&self) -> StoreResult<Option<PersistedTimer>>;
    fn clear(&self) -> StoreResult<()>;
}

/// JSON file backed store
#[derive(Debug, Clone)]
pub struct FileTimerStore {
    path: PathBuf,
}

impl FileTimerStore {
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TimerStore for FileTimerStore {
    fn save(&self, timer: &PersistedTimer) -> StoreResult<()> {
        let contents = serde_json::to_string_pretty(timer)?;
        // Write then rename so a crash never leaves a half-written record.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted timer state to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> StoreResult<Option<PersistedTimer>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn clear(&self) -> StoreResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, used by tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryTimerStore {
    record: Mutex<Option<PersistedTimer>>,
}

impl MemoryTimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: PersistedTimer) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl TimerStore for MemoryTimerStore {
    fn save(&self, timer: &PersistedTimer) -> StoreResult<()> {
        let mut record = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        *record = Some(timer.clone());
        Ok(())
    }

    fn load(&self) -> StoreResult<Option<PersistedTimer>> {
        let record = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(record.clone())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut record = self.record.lock().map_err(|_| StoreError::Poisoned)?;
        *record = None;
        Ok(())
    }
}

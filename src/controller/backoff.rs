//! Requeue backoff policy for transient reconciliation errors.
//!
//! A profile maps consecutive transient results to a monotonically
//! increasing delay, capped at the profile's max interval. Once the
//! cumulative wait since the first transient result for a key exceeds
//! the profile's max total wait, retries stop and the error escalates
//! to fatal-for-now.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Trait for getting the current time
///
/// Production code uses `SystemClock`; tests use `MockClock` to drive
/// the cumulative-wait bookkeeping deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to `chrono::Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Named backoff profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    /// For errors expected to resolve quickly, like an asynchronous
    /// legacy-object deletion finishing
    Short,
    /// For errors depending on slower external convergence, like a
    /// failing Helm or Kubernetes call
    Long,
}

impl Profile {
    /// Largest delay between two consecutive ticks
    pub fn max_interval(&self) -> Duration {
        match self {
            Profile::Short => Duration::from_secs(5),
            Profile::Long => Duration::from_secs(60),
        }
    }

    /// Cumulative wait after which retries escalate to fatal-for-now
    pub fn max_total_wait(&self) -> Duration {
        match self {
            Profile::Short => Duration::from_secs(4 * 60),
            Profile::Long => Duration::from_secs(40 * 60),
        }
    }

    /// Delay before the next tick for the given consecutive attempt
    /// count (0-indexed). Doubles from one second, capped at the
    /// profile's max interval.
    pub fn delay(&self, attempt: u32) -> Duration {
        let secs = 1u64 << attempt.min(16);
        Duration::from_secs(secs).min(self.max_interval())
    }
}

struct KeyState {
    attempt: u32,
    first_transient_at: DateTime<Utc>,
}

/// Per-key backoff bookkeeping carried between ticks.
///
/// Keys are deployment identifiers (`namespace/name`); no other state
/// crosses ticks. The map is reset per key when a tick finally
/// succeeds.
pub struct BackoffTracker {
    clock: Arc<dyn Clock>,
    keys: Mutex<HashMap<String, KeyState>>,
}

impl BackoffTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Record a transient result for `key` and return the delay before
    /// the next tick, or `None` once the cumulative wait since the
    /// first transient result exceeds the profile's max total wait.
    pub fn next_delay(&self, key: &str, profile: Profile) -> Option<Duration> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let state = keys.entry(key.to_string()).or_insert(KeyState {
            attempt: 0,
            first_transient_at: now,
        });

        let elapsed = (now - state.first_transient_at)
            .to_std()
            .unwrap_or_default();
        if elapsed > profile.max_total_wait() {
            return None;
        }

        let delay = profile.delay(state.attempt);
        state.attempt = state.attempt.saturating_add(1);
        Some(delay)
    }

    /// Forget all bookkeeping for `key`. Called when a tick succeeds.
    pub fn reset(&self, key: &str) {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.remove(key);
    }
}

/// Mock clock for testing with controllable time
#[cfg(test)]
pub struct MockClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("MockClock lock poisoned");
        *now += duration;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("MockClock lock poisoned")
    }
}

//! Upstream rate-limit tracking
//!
//! One [`RateLimitTracker`] models the request budget of one upstream
//! account. It is shared by every request against that upstream, not kept per
//! cache key.
//!
//! ```text
//!            429 observed
//!   Normal ───────────────▶ Backoff ──┐ 429 observed
//!     ▲                        │  ▲───┘ (failures compound)
//!     │  now - last_hit_at     │
//!     └──── >= backoff ────────┘
//! ```
//!
//! Leaving Backoff on deadline does not reset the failure counter; only an
//! upstream success does.

use crate::constants::{RATE_LIMIT_BASE_BACKOFF_MS, RATE_LIMIT_MAX_BACKOFF_MS};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Mutable backoff state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub is_limited: bool,
    pub last_hit_at: Option<Instant>,
    pub consecutive_failures: u32,
    pub backoff_ms: u64,
}

/// Serializable view of [`RateLimitState`] for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub is_limited: bool,
    pub consecutive_failures: u32,
    pub backoff_ms: u64,
    /// Remaining wait if currently limited
    pub remaining_ms: Option<u64>,
}

/// Tracks whether an upstream is in backoff and for how long
#[derive(Debug)]
pub struct RateLimitTracker {
    state: Mutex<RateLimitState>,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new(RATE_LIMIT_BASE_BACKOFF_MS, RATE_LIMIT_MAX_BACKOFF_MS)
    }
}

impl RateLimitTracker {
    /// Creates a tracker with the given backoff base and cap (milliseconds)
    pub fn new(base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            state: Mutex::new(RateLimitState {
                is_limited: false,
                last_hit_at: None,
                consecutive_failures: 0,
                backoff_ms: base_backoff_ms,
            }),
            base_backoff_ms,
            max_backoff_ms,
        }
    }

    /// `min(max, 2^failures * base)`, saturating
    fn backoff_for(&self, consecutive_failures: u32) -> u64 {
        2u64.checked_pow(consecutive_failures)
            .and_then(|factor| factor.checked_mul(self.base_backoff_ms))
            .unwrap_or(u64::MAX)
            .min(self.max_backoff_ms)
    }

    /// Records an upstream 429 and returns the new backoff window
    pub fn record_rate_limit(&self, now: Instant) -> Duration {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.backoff_ms = self.backoff_for(state.consecutive_failures);
        state.is_limited = true;
        state.last_hit_at = Some(now);

        tracing::warn!(
            consecutive_failures = state.consecutive_failures,
            backoff_ms = state.backoff_ms,
            "Upstream rate limit hit, entering backoff"
        );

        Duration::from_millis(state.backoff_ms)
    }

    /// Records a successful upstream response
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures > 0 || state.is_limited {
            tracing::info!(
                consecutive_failures = state.consecutive_failures,
                "Upstream recovered, resetting backoff"
            );
        }
        state.consecutive_failures = 0;
        state.backoff_ms = self.base_backoff_ms;
        state.is_limited = false;
    }

    /// Checks whether a request may go out at `now`
    ///
    /// Returns the remaining wait while the backoff window is open. The first
    /// check past the deadline moves the tracker back to Normal.
    pub fn check(&self, now: Instant) -> Result<(), Duration> {
        let mut state = self.state.lock();
        if !state.is_limited {
            return Ok(());
        }

        let backoff = Duration::from_millis(state.backoff_ms);
        let elapsed = state
            .last_hit_at
            .map(|hit| now.saturating_duration_since(hit))
            .unwrap_or(backoff);

        if elapsed >= backoff {
            state.is_limited = false;
            tracing::debug!(
                consecutive_failures = state.consecutive_failures,
                "Backoff window elapsed, resuming upstream requests"
            );
            Ok(())
        } else {
            Err(backoff - elapsed)
        }
    }

    /// Copy of the current state
    pub fn state(&self) -> RateLimitState {
        self.state.lock().clone()
    }

    /// Serializable view of the current state, without mutating it
    pub fn snapshot(&self, now: Instant) -> RateLimitSnapshot {
        let state = self.state.lock();
        let remaining_ms = match (state.is_limited, state.last_hit_at) {
            (true, Some(hit)) => {
                let elapsed = now.saturating_duration_since(hit);
                Duration::from_millis(state.backoff_ms)
                    .checked_sub(elapsed)
                    .map(|d| d.as_millis() as u64)
            }
            _ => None,
        };

        RateLimitSnapshot {
            is_limited: state.is_limited,
            consecutive_failures: state.consecutive_failures,
            backoff_ms: state.backoff_ms,
            remaining_ms,
        }
    }
}

//! Per-client brute-force protection.
//!
//! Each client identity (the peer's network address as a string) moves
//! through these states:
//!
//! ```text
//! CLEAR ──failure──▶ FAILING(n) ──block()──▶ BLOCKED ──duration elapsed──▶ CLEAR
//!   ▲                    │
//!   └──── clear() ───────┘
//! ```
//!
//! The guard only keeps counts and timestamps.  Deciding when to call
//! [`LockoutGuard::block`] and what to answer the client is the caller's job:
//! the usual policy is "block once [`LockoutGuard::failure_count`] reaches
//! [`LockoutPolicy::max_failed_attempts`]".
//!
//! State is held in memory only and is lost on restart.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::{Clock, SystemClock};

/// Failed attempts allowed before a client is blocked.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 3;

/// How long a block lasts.
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(60 * 60);

/// Thresholds for the lockout state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
    pub max_failed_attempts: u32,
    pub block_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            block_duration: DEFAULT_BLOCK_DURATION,
        }
    }
}

/// Failed-attempt counters and active blocks, keyed by client identity.
#[derive(Debug)]
pub struct LockoutGuard<C = SystemClock> {
    policy: LockoutPolicy,
    clock: C,
    failed_attempts: HashMap<String, u32>,
    blocked_since: HashMap<String, Instant>,
}

impl LockoutGuard<SystemClock> {
    /// Creates a guard on the system clock.
    pub fn new(policy: LockoutPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl<C: Clock> LockoutGuard<C> {
    /// Creates a guard reading time from `clock`.
    pub fn with_clock(policy: LockoutPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
            failed_attempts: HashMap::new(),
            blocked_since: HashMap::new(),
        }
    }

    /// Returns `true` while `id` is inside its block window.
    ///
    /// An expired block is removed on the spot, so the client starts over
    /// from a clean state.
    pub fn is_blocked(&mut self, id: &str) -> bool {
        let Some(&since) = self.blocked_since.get(id) else {
            return false;
        };
        if self.expired(since) {
            self.blocked_since.remove(id);
            debug!(client = id, "block expired");
            return false;
        }
        true
    }

    /// Counts one failed authentication and returns the new total.
    pub fn record_failure(&mut self, id: &str) -> u32 {
        let count = self.failed_attempts.entry(id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Current number of failed attempts for `id` (0 if none).
    pub fn failure_count(&self, id: &str) -> u32 {
        self.failed_attempts.get(id).copied().unwrap_or(0)
    }

    /// Returns `true` once `id` has used up its allowed attempts.
    pub fn threshold_reached(&self, id: &str) -> bool {
        self.failure_count(id) >= self.policy.max_failed_attempts
    }

    /// Blocks `id` starting now and resets its failure counter.
    pub fn block(&mut self, id: &str) {
        let now = self.clock.now();
        self.blocked_since.insert(id.to_string(), now);
        self.failed_attempts.remove(id);
        debug!(client = id, duration = ?self.policy.block_duration, "client blocked");
    }

    /// Forgets the failure counter for `id`.  Does nothing if there is none.
    pub fn clear(&mut self, id: &str) {
        self.failed_attempts.remove(id);
    }

    /// Drops every block whose window has elapsed and returns how many went.
    ///
    /// Run this periodically so clients that never come back do not stay
    /// in memory forever.
    pub fn sweep_expired(&mut self) -> usize {
        let now = self.clock.now();
        let duration = self.policy.block_duration;
        let before = self.blocked_since.len();
        self.blocked_since
            .retain(|_, since| now.saturating_duration_since(*since) < duration);
        let removed = before - self.blocked_since.len();
        if removed > 0 {
            debug!(removed, "swept expired blocks");
        }
        removed
    }

    /// Number of clients currently holding a block entry (expired or not).
    pub fn blocked_len(&self) -> usize {
        self.blocked_since.len()
    }

    fn expired(&self, since: Instant) -> bool {
        self.clock.now().saturating_duration_since(since) >= self.policy.block_duration
    }
}

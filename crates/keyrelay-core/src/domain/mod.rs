//! Domain rules with no infrastructure dependencies.
//!
//! The lockout guard is pure bookkeeping: it never sleeps, never spawns a
//! timer, and reads time only through the [`Clock`] it was given.  The outer
//! layers decide when to sweep and what to tell a blocked client.

pub mod clock;

/// Brute-force protection for the login gate.
///
/// See [`lockout::LockoutGuard`] for the main type.
pub mod lockout;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lockout::{LockoutGuard, LockoutPolicy, DEFAULT_BLOCK_DURATION, DEFAULT_MAX_FAILED_ATTEMPTS};

//! AuthGate: admission control for the control page and the send endpoint.
//!
//! The control page goes through [`AuthGate::admit`] and the send endpoint
//! through [`AuthGate::authorize`].  Both combine the lockout guard with an
//! HTTP Basic credential check and share one set of failure counters:
//!
//! 1. A client inside its block window is refused outright.
//! 2. A request with no `Authorization` header gets a challenge.  It is not
//!    counted as a failure, since browsers send one such request before
//!    prompting the user.
//! 3. Wrong (or malformed) credentials are counted.  Reaching the threshold
//!    blocks the client; otherwise it is challenged again.
//! 4. Correct credentials reset the counter.
//!
//! On the control page each outcome except the bare challenge raises an
//! [`AlertEvent`].  The send endpoint raises none here; its handler reports
//! the keystrokes it sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyrelay_core::domain::{Clock, LockoutGuard, LockoutPolicy};
use tracing::{info, warn};

use crate::domain::AlertEvent;

/// Receives alert events.  Implementations must not block the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, event: AlertEvent);
}

/// What the HTTP layer should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Credentials accepted.
    Granted,
    /// The client is blocked; nothing was checked.
    Blocked,
    /// No credentials were offered.
    ChallengeRequired,
    /// Credentials rejected; attempts remain.
    Failed,
    /// Credentials rejected and the client has just been blocked.
    LockedOut,
}

/// Username and password from a Basic `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Decodes `Basic <base64(user:pass)>`.  Returns `None` for any other
    /// scheme or malformed payload.
    pub fn from_basic_header(value: &str) -> Option<Self> {
        let (scheme, payload) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(payload.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Lockout-aware credential check shared by all request handlers.
pub struct AuthGate {
    expected: Credentials,
    guard: Mutex<LockoutGuard<Arc<dyn Clock>>>,
    notifier: Arc<dyn Notifier>,
}

impl AuthGate {
    pub fn new(
        expected: Credentials,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            expected,
            guard: Mutex::new(LockoutGuard::with_clock(policy, clock)),
            notifier,
        }
    }

    /// Decides whether the client at `ip` may see `page`, alerting on every
    /// credential check.
    ///
    /// `authorization` is the raw `Authorization` header value, if any.
    pub fn admit(&self, ip: &str, page: &str, authorization: Option<&str>) -> GateDecision {
        self.decide(ip, page, authorization, true)
    }

    /// Decides whether the client at `ip` may call `route`.
    ///
    /// Failures count toward the same lockout as [`admit`](Self::admit), but
    /// no alert is raised for any outcome.
    pub fn authorize(&self, ip: &str, route: &str, authorization: Option<&str>) -> GateDecision {
        self.decide(ip, route, authorization, false)
    }

    fn decide(
        &self,
        ip: &str,
        page: &str,
        authorization: Option<&str>,
        alerting: bool,
    ) -> GateDecision {
        let raise = |event: AlertEvent| {
            if alerting {
                self.notifier.notify(event);
            }
        };
        let mut guard = self.lock_guard();

        if guard.is_blocked(ip) {
            warn!(client = ip, page, "request from blocked client");
            return GateDecision::Blocked;
        }

        let Some(header) = authorization else {
            return GateDecision::ChallengeRequired;
        };

        let accepted = Credentials::from_basic_header(header)
            .map(|c| c == self.expected)
            .unwrap_or(false);

        if accepted {
            guard.clear(ip);
            drop(guard);
            info!(client = ip, page, "authentication succeeded");
            raise(AlertEvent::AuthSucceeded {
                ip: ip.to_string(),
                page: page.to_string(),
            });
            return GateDecision::Granted;
        }

        let attempts = guard.record_failure(ip);
        warn!(client = ip, page, attempts, "authentication failed");
        let locked_out = guard.threshold_reached(ip);
        if locked_out {
            guard.block(ip);
        }
        drop(guard);

        raise(AlertEvent::AuthFailed {
            ip: ip.to_string(),
            page: page.to_string(),
        });
        if locked_out {
            warn!(client = ip, "failed-attempt threshold reached; client blocked");
            raise(AlertEvent::ThresholdReached {
                ip: ip.to_string(),
                page: page.to_string(),
            });
            return GateDecision::LockedOut;
        }
        GateDecision::Failed
    }

    /// Purges expired blocks and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let mut guard = self.lock_guard();
        let removed = guard.sweep_expired();
        if removed > 0 {
            info!(removed, still_blocked = guard.blocked_len(), "expired client blocks purged");
        }
        removed
    }

    /// Failed attempts currently recorded for `ip`.
    pub fn failure_count(&self, ip: &str) -> u32 {
        self.lock_guard().failure_count(ip)
    }

    /// Forwards an event to the configured notifier.
    pub fn notify(&self, event: AlertEvent) {
        self.notifier.notify(event);
    }

    fn lock_guard(&self) -> MutexGuard<'_, LockoutGuard<Arc<dyn Clock>>> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! TypeKeystrokesUseCase: compiles a command and plays it out on the HID endpoint.
//!
//! This use case sits at the application layer and delegates every report to
//! a [`HidReportSink`] trait object.  The device-node implementation lives in
//! the infrastructure layer, next to a recording mock for tests.
//!
//! # Timing
//!
//! For every keystroke:
//!
//! ```text
//! wait ready ─▶ press ─▶ press_settle ─▶ wait ready ─▶ release ─▶ release_settle
//! ```
//!
//! The readiness wait polls every millisecond.  It gives up with
//! [`HidError::NotReady`] once `ready_timeout` has passed, or with
//! [`HidError::Cancelled`] as soon as the shutdown flag is cleared.  With no
//! timeout it waits for as long as it takes.
//!
//! Sinks never block in `send_report`.  A sink that reports ready but then
//! finds the endpoint full returns [`HidError::Busy`], and the report goes
//! back to the readiness wait under the same deadline.
//!
//! All of this blocks the calling thread; run it on a blocking worker.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use keyrelay_core::{KeySymbolTables, KeyboardReport, KeystrokeCompiler};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for HID output.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("HID endpoint not ready after {0:?}")]
    NotReady(Duration),
    #[error("keystroke output cancelled by shutdown")]
    Cancelled,
    #[error("HID endpoint busy")]
    Busy,
    #[error("HID write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for keyboard reports.
pub trait HidReportSink: Send + Sync {
    /// Returns `true` when the endpoint can take the next report.
    fn is_ready(&self) -> bool;

    /// Writes one report without blocking.  Returns [`HidError::Busy`] if
    /// the endpoint cannot take it right now.
    fn send_report(&self, report: &KeyboardReport) -> Result<(), HidError>;
}

/// Settle delays and readiness bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterTiming {
    pub press_settle: Duration,
    pub release_settle: Duration,
    pub poll_interval: Duration,
    /// `None` waits for readiness without a bound.
    pub ready_timeout: Option<Duration>,
}

impl Default for EmitterTiming {
    fn default() -> Self {
        Self {
            press_settle: Duration::from_millis(5),
            release_settle: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
            ready_timeout: Some(Duration::from_millis(1000)),
        }
    }
}

/// The Type Keystrokes use case.
pub struct TypeKeystrokesUseCase {
    sink: Arc<dyn HidReportSink>,
    tables: KeySymbolTables,
    timing: EmitterTiming,
    running: Arc<AtomicBool>,
}

impl TypeKeystrokesUseCase {
    /// Creates a use case writing to `sink`.  Clearing `running` aborts any
    /// readiness wait in progress.
    pub fn new(sink: Arc<dyn HidReportSink>, timing: EmitterTiming, running: Arc<AtomicBool>) -> Self {
        Self {
            sink,
            tables: KeySymbolTables::new(),
            timing,
            running,
        }
    }

    /// Types `command` and returns the number of keystrokes sent.
    ///
    /// # Errors
    ///
    /// Returns [`HidError`] if the endpoint does not become ready in time,
    /// shutdown begins, or a write fails.  A release report is attempted
    /// before returning so no key is left held down.
    pub fn type_command(&self, command: &str) -> Result<usize, HidError> {
        let compiler = KeystrokeCompiler::new(&self.tables);
        let mut sent = 0;

        for keystroke in compiler.compile(command) {
            if let Err(e) = self.play(keystroke.press(), keystroke.release()) {
                self.release_all();
                return Err(e);
            }
            sent += 1;
        }

        debug!(keystrokes = sent, "command typed");
        Ok(sent)
    }

    fn play(&self, press: KeyboardReport, release: KeyboardReport) -> Result<(), HidError> {
        self.emit(&press)?;
        thread::sleep(self.timing.press_settle);
        self.emit(&release)?;
        thread::sleep(self.timing.release_settle);
        Ok(())
    }

    /// Waits for readiness, then writes one report.
    ///
    /// # Errors
    ///
    /// See [`type_command`](Self::type_command).
    pub fn emit(&self, report: &KeyboardReport) -> Result<(), HidError> {
        let started = Instant::now();
        loop {
            self.wait_ready(started)?;
            match self.sink.send_report(report) {
                Err(HidError::Busy) => {
                    self.check_deadline(started)?;
                    thread::sleep(self.timing.poll_interval);
                }
                other => {
                    debug!(bytes = ?report.to_bytes(), "HID report");
                    return other;
                }
            }
        }
    }

    fn wait_ready(&self, started: Instant) -> Result<(), HidError> {
        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Err(HidError::Cancelled);
            }
            if self.sink.is_ready() {
                return Ok(());
            }
            self.check_deadline(started)?;
            thread::sleep(self.timing.poll_interval);
        }
    }

    fn check_deadline(&self, started: Instant) -> Result<(), HidError> {
        match self.timing.ready_timeout {
            Some(limit) if started.elapsed() >= limit => Err(HidError::NotReady(limit)),
            _ => Ok(()),
        }
    }

    /// Best-effort release without waiting for readiness.
    fn release_all(&self) {
        if let Err(e) = self.sink.send_report(&KeyboardReport::RELEASE) {
            warn!("could not send release report after HID error: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

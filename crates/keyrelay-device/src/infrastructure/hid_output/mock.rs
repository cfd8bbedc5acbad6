//! In-memory HID sinks.
//!
//! `MockHidSink` pushes every report into a `Mutex<Vec<...>>` so tests can
//! assert exactly what would have reached the host, and in what order.
//! Readiness can be toggled from another thread with
//! [`MockHidSink::set_ready`] to exercise the wait logic, and
//! [`MockHidSink::set_busy_writes`] makes the next writes report a full
//! endpoint.
//!
//! `DryRunHidSink` is always ready and only logs, for running the service on
//! a machine without a gadget.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex, PoisonError,
};

use keyrelay_core::KeyboardReport;
use tracing::info;

use crate::application::type_keystrokes::{HidError, HidReportSink};

/// A sink that records all reports without touching a device.
pub struct MockHidSink {
    reports: Mutex<Vec<KeyboardReport>>,
    ready: AtomicBool,
    busy_writes: AtomicUsize,
    /// When `true`, every write returns `HidError::Io`.
    pub should_fail: bool,
}

impl MockHidSink {
    /// Creates a ready sink with no recorded reports.
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            busy_writes: AtomicUsize::new(0),
            should_fail: false,
        }
    }

    /// Creates a ready sink whose writes always fail.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Makes the next `count` writes return `HidError::Busy`.
    pub fn set_busy_writes(&self, count: usize) {
        self.busy_writes.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every report written so far.
    pub fn reports(&self) -> Vec<KeyboardReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockHidSink {
    fn default() -> Self {
        Self::new()
    }
}

impl HidReportSink for MockHidSink {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn send_report(&self, report: &KeyboardReport) -> Result<(), HidError> {
        if self.should_fail {
            return Err(HidError::Io(std::io::Error::other("mock failure")));
        }
        let busy = self
            .busy_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if busy.is_ok() {
            return Err(HidError::Busy);
        }
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*report);
        Ok(())
    }
}

/// A sink that logs each report at `info` and discards it.
#[derive(Debug, Default)]
pub struct DryRunHidSink;

impl HidReportSink for DryRunHidSink {
    fn is_ready(&self) -> bool {
        true
    }

    fn send_report(&self, report: &KeyboardReport) -> Result<(), HidError> {
        if report.is_release() {
            info!("dry run: HID release");
            return Ok(());
        }
        let keys: Vec<u8> = report.pressed_keys().collect();
        info!(
            modifier = report.modifier,
            keys = ?keys,
            "dry run: HID report"
        );
        Ok(())
    }
}

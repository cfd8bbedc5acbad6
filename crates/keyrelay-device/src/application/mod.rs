//! Application layer use cases for the device service.
//!
//! # What use cases does the device have?
//!
//! - **`auth_gate`** – Decides whether a request may proceed: checks the
//!   lockout guard, verifies Basic credentials, counts failures, blocks
//!   clients that reach the threshold, and raises alert events.
//!
//! - **`type_keystrokes`** – Compiles an operator command into keyboard
//!   reports and plays them out through a `HidReportSink`, with the settle
//!   delays and the readiness wait the gadget needs.

pub mod auth_gate;
pub mod type_keystrokes;

pub use auth_gate::{AuthGate, Credentials, GateDecision, Notifier};
pub use type_keystrokes::{EmitterTiming, HidError, HidReportSink, TypeKeystrokesUseCase};

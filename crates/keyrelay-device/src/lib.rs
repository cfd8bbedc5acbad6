//! keyrelay-device library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does keyrelay-device do?
//!
//! The device is a small Linux board attached to a target computer through
//! a USB gadget port, where it enumerates as an ordinary keyboard.  It runs
//! an HTTP service on the LAN:
//!
//! 1. An operator opens the control page and logs in with HTTP Basic auth.
//!    Repeated failures from one address block that address for an hour.
//! 2. The operator submits a command such as `CTRL+ALT+DEL` or `Hello World`.
//! 3. The command is compiled into 8-byte keyboard reports
//!    (`keyrelay_core::compiler`) and written to the gadget node, press and
//!    release in turn, with short settle delays.
//! 4. Logins, failures, blocks, and sent commands are reported to an optional
//!    webhook.

/// Domain layer: configuration schema and alert events.
pub mod domain;

/// Application layer: authentication gate and keystroke typing use cases.
pub mod application;

/// Infrastructure layer: HID sinks, HTTP server, notifier, and config storage.
pub mod infrastructure;

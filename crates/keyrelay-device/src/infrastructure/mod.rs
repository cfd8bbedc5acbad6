//! Infrastructure layer for the device service.
//!
//! Contains the adapters that touch the outside world: the HID gadget node,
//! the HTTP listener, the webhook client, and the config file.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `keyrelay_core`, but MUST NOT be imported by them.
//!
//! # Sub-modules
//!
//! - **`hid_output`** – `HidReportSink` implementations: the Linux gadget
//!   writer, plus a recording mock and a log-only dry-run sink.
//!
//! - **`http_server`** – hyper-based accept loop, routing for the control
//!   page and `/send`, and the periodic lockout sweep.
//!
//! - **`notifier`** – Fire-and-forget webhook alerts via `reqwest`.
//!
//! - **`storage`** – Loads `AppConfig` from a TOML or legacy `key=value` file.

pub mod hid_output;
pub mod http_server;
pub mod notifier;
pub mod storage;

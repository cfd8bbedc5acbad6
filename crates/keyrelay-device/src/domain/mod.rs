//! Domain types for the device service: configuration and alert events.
//!
//! Plain data with no I/O.  The infrastructure layer fills [`AppConfig`] from
//! disk and the CLI; the application layer raises [`AlertEvent`]s.

pub mod alerts;
pub mod config;

pub use alerts::AlertEvent;
pub use config::{AppConfig, ConfigError};

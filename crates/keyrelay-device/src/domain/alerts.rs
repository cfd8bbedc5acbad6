//! Security and activity events reported to the operator.
//!
//! Each event renders to a single line of text; that line is what the
//! webhook posts.

use std::fmt;

/// Something the operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    /// Wrong credentials that did not yet trigger a block.
    AuthFailed { ip: String, page: String },
    /// Wrong credentials that used up the last attempt; the client is now blocked.
    ThresholdReached { ip: String, page: String },
    AuthSucceeded { ip: String, page: String },
    KeystrokesSent { ip: String, data: String },
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertEvent::AuthFailed { ip, page } => {
                write!(f, "Authentication failed for IP: {ip} on page {page}")
            }
            AlertEvent::ThresholdReached { ip, page } => write!(
                f,
                "Failed authentication attempt threshold reached for IP: {ip} on page {page}"
            ),
            AlertEvent::AuthSucceeded { ip, page } => {
                write!(f, "Successful authentication for IP: {ip} on page {page}")
            }
            AlertEvent::KeystrokesSent { ip, data } => {
                write!(f, "Keystrokes sent by IP: {ip} - Data: '{data}'")
            }
        }
    }
}

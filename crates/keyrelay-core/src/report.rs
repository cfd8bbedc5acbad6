//! Boot-protocol keyboard report (8 bytes).
//!
//! ```text
//! Byte 0:   modifier bitfield (see crate::keymap::ModifierFlags)
//! Byte 1:   reserved, always 0x00
//! Byte 2-7: up to 6 simultaneously pressed key usages, unused slots 0x00
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keymap::HidKey;

/// Size of an encoded report in bytes.
pub const REPORT_LEN: usize = 8;

/// Maximum number of non-modifier keys one report can hold.
pub const MAX_KEYS: usize = 6;

/// Errors from decoding raw report bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("keyboard report must be 8 bytes, got {0}")]
    Length(usize),
}

/// One keyboard report: the modifier byte plus six key slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyboardReport {
    pub modifier: u8,
    pub keycodes: [u8; MAX_KEYS],
}

impl KeyboardReport {
    /// The all-keys-released report.
    pub const RELEASE: KeyboardReport = KeyboardReport {
        modifier: 0,
        keycodes: [0; MAX_KEYS],
    };

    /// A report pressing a single key with its own modifier.
    pub fn single(key: HidKey) -> Self {
        let mut keycodes = [0; MAX_KEYS];
        keycodes[0] = key.keycode.as_u8();
        Self {
            modifier: key.modifier.bits(),
            keycodes,
        }
    }

    /// Returns `true` for the all-zero release report.
    pub fn is_release(&self) -> bool {
        *self == Self::RELEASE
    }

    /// Non-zero key slots in order.
    pub fn pressed_keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.keycodes.iter().copied().filter(|&k| k != 0)
    }

    /// Encodes the report for the HID endpoint.
    pub fn to_bytes(&self) -> [u8; REPORT_LEN] {
        let mut buf = [0u8; REPORT_LEN];
        buf[0] = self.modifier;
        buf[2..].copy_from_slice(&self.keycodes);
        buf
    }

    /// Decodes a report written by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Length`] unless `bytes` is exactly 8 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReportError> {
        if bytes.len() != REPORT_LEN {
            return Err(ReportError::Length(bytes.len()));
        }
        let mut keycodes = [0u8; MAX_KEYS];
        keycodes.copy_from_slice(&bytes[2..]);
        Ok(Self {
            modifier: bytes[0],
            keycodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::HidKeyCode;

    #[test]
    fn test_release_report_encodes_to_eight_zero_bytes() {
        assert_eq!(KeyboardReport::RELEASE.to_bytes(), [0u8; 8]);
        assert!(KeyboardReport::RELEASE.is_release());
    }

    #[test]
    fn test_single_key_report_layout() {
        // Arrange
        let report = KeyboardReport::single(HidKey::shifted(HidKeyCode::KeyA));

        // Act
        let bytes = report.to_bytes();

        // Assert
        assert_eq!(bytes, [0x02, 0x00, 0x04, 0, 0, 0, 0, 0]);
        assert!(!report.is_release());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert_eq!(KeyboardReport::from_bytes(&[0; 7]), Err(ReportError::Length(7)));
        assert_eq!(KeyboardReport::from_bytes(&[0; 9]), Err(ReportError::Length(9)));
    }

    #[test]
    fn test_from_bytes_ignores_reserved_byte() {
        let report = KeyboardReport::from_bytes(&[0x05, 0xFF, 0x4C, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(report.modifier, 0x05);
        assert_eq!(report.pressed_keys().collect::<Vec<_>>(), vec![0x4C]);
    }
}

//! # keyrelay-core
//!
//! Device-independent core of keyrelay: turns typed command strings into
//! USB HID keyboard reports, and tracks failed logins per client.
//!
//! Nothing in this crate touches a device node, a socket, or the clock
//! directly (time comes in through [`domain::Clock`]), so all of it can be
//! tested on any machine.
//!
//! # Architecture overview
//!
//! keyrelay runs on a small board that is plugged into a target computer as
//! a USB keyboard.  An operator types a command in a web form, for example
//! `CTRL+ALT+DEL` or `Hello World`, and the board "types" it on the target.
//!
//! - **`keymap`** – HID usage IDs, the modifier byte, and the lookup tables
//!   from names (`ENTER`, `F5`, `CTRL`) and ASCII characters to keys.
//!
//! - **`compiler`** – The keystroke sequence compiler: a lazy iterator that
//!   splits the command into segments and yields one keystroke per key or
//!   chord.
//!
//! - **`report`** – The 8-byte boot keyboard report the HID gadget expects.
//!
//! - **`domain`** – The lockout guard that blocks a client after repeated
//!   failed authentication, plus the clock abstraction it runs on.

pub mod compiler;
pub mod domain;
pub mod keymap;
pub mod report;

// Re-export the most-used types so callers can write `keyrelay_core::KeystrokeCompiler`.
pub use compiler::{Keystroke, KeystrokeCompiler, Keystrokes, Reports};
pub use domain::{Clock, LockoutGuard, LockoutPolicy, ManualClock, SystemClock};
pub use keymap::{HidKey, HidKeyCode, KeySymbolTables, ModifierFlags, Symbol};
pub use report::{KeyboardReport, ReportError, MAX_KEYS, REPORT_LEN};

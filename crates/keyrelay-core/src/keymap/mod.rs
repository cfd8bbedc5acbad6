//! Key tables: HID usage IDs, the modifier byte, and the name/character
//! lookups that turn command tokens into keys.

pub mod hid;
pub mod symbols;

pub use hid::{HidKey, HidKeyCode, ModifierFlags};
pub use symbols::{KeySymbolTables, Symbol};

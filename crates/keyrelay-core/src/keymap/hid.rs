//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page) and the modifier byte.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a unique number to
//! every key on a keyboard.  These numbers are called *Usage IDs* and they are
//! grouped by *Usage Page*.  All keyboard keys are on page 0x07 ("Keyboard/Keypad").
//!
//! | Key          | HID Usage ID |
//! |--------------|-------------|
//! | Letter A     | 0x04        |
//! | Digit 1      | 0x1E        |
//! | Enter        | 0x28        |
//! | Left Ctrl    | 0xE0        |
//!
//! HID codes represent **physical key positions**, not characters.  The
//! character a key produces depends on the host's layout and on the modifier
//! keys held down, which is why `'A'` is sent as `KeyA` plus Left Shift.
//!
//! # The modifier byte
//!
//! A boot-protocol keyboard report does not list Ctrl/Shift/Alt/GUI in its
//! six key slots.  Instead the first byte of the report is a bitfield with one
//! bit per modifier key, see [`ModifierFlags`].

use serde::{Deserialize, Serialize};

/// USB HID Usage ID for keyboard keys (page 0x07).
///
/// The numeric value of each variant is its HID Usage ID on the keyboard/keypad page.
/// [`HidKeyCode::Unknown`] is the "no mapping" sentinel (value 0x00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digits (HID 0x1E–0x27)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Control and punctuation keys (HID 0x28–0x38)
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    Minus = 0x2D,
    Equal = 0x2E,
    BracketLeft = 0x2F,
    BracketRight = 0x30,
    Backslash = 0x31,
    Semicolon = 0x33,
    Quote = 0x34,
    Backquote = 0x35,
    Comma = 0x36,
    Period = 0x37,
    Slash = 0x38,

    CapsLock = 0x39,

    // Function keys F1–F12 (HID 0x3A–0x45)
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,

    // Navigation cluster (HID 0x46–0x52)
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,

    // Numpad (HID 0x53–0x63)
    NumLock = 0x53,
    NumpadDivide = 0x54,
    NumpadMultiply = 0x55,
    NumpadSubtract = 0x56,
    NumpadAdd = 0x57,
    NumpadEnter = 0x58,
    Numpad1 = 0x59,
    Numpad2 = 0x5A,
    Numpad3 = 0x5B,
    Numpad4 = 0x5C,
    Numpad5 = 0x5D,
    Numpad6 = 0x5E,
    Numpad7 = 0x5F,
    Numpad8 = 0x60,
    Numpad9 = 0x61,
    Numpad0 = 0x62,
    NumpadDecimal = 0x63,

    ContextMenu = 0x65,
    NumpadEqual = 0x67,

    // Function keys F13–F24 (HID 0x68–0x73)
    F13 = 0x68,
    F14 = 0x69,
    F15 = 0x6A,
    F16 = 0x6B,
    F17 = 0x6C,
    F18 = 0x6D,
    F19 = 0x6E,
    F20 = 0x6F,
    F21 = 0x70,
    F22 = 0x71,
    F23 = 0x72,
    F24 = 0x73,

    NumpadComma = 0x85,

    // Modifier keys as plain usages (HID 0xE0–0xE7)
    ControlLeft = 0xE0,
    ShiftLeft = 0xE1,
    AltLeft = 0xE2,
    MetaLeft = 0xE3,
    ControlRight = 0xE4,
    ShiftRight = 0xE5,
    AltRight = 0xE6,
    MetaRight = 0xE7,

    /// Sentinel for keys with no HID mapping.
    Unknown = 0x00,
}

impl HidKeyCode {
    /// The 26 letter keys in alphabetical order.
    pub const LETTERS: [HidKeyCode; 26] = [
        HidKeyCode::KeyA, HidKeyCode::KeyB, HidKeyCode::KeyC, HidKeyCode::KeyD,
        HidKeyCode::KeyE, HidKeyCode::KeyF, HidKeyCode::KeyG, HidKeyCode::KeyH,
        HidKeyCode::KeyI, HidKeyCode::KeyJ, HidKeyCode::KeyK, HidKeyCode::KeyL,
        HidKeyCode::KeyM, HidKeyCode::KeyN, HidKeyCode::KeyO, HidKeyCode::KeyP,
        HidKeyCode::KeyQ, HidKeyCode::KeyR, HidKeyCode::KeyS, HidKeyCode::KeyT,
        HidKeyCode::KeyU, HidKeyCode::KeyV, HidKeyCode::KeyW, HidKeyCode::KeyX,
        HidKeyCode::KeyY, HidKeyCode::KeyZ,
    ];

    /// Digit keys `1`–`9` followed by `0`, in physical row order.
    pub const DIGIT_ROW: [HidKeyCode; 10] = [
        HidKeyCode::Digit1, HidKeyCode::Digit2, HidKeyCode::Digit3, HidKeyCode::Digit4,
        HidKeyCode::Digit5, HidKeyCode::Digit6, HidKeyCode::Digit7, HidKeyCode::Digit8,
        HidKeyCode::Digit9, HidKeyCode::Digit0,
    ];

    /// Returns the raw USB HID Usage ID value for this key code.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

}

/// Modifier byte of a boot-protocol keyboard report.
///
/// Bit layout follows the HID specification: bits 0–3 are the left-hand
/// Ctrl/Shift/Alt/GUI keys, bits 4–7 the right-hand ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    /// No modifier held.
    pub const NONE: ModifierFlags = ModifierFlags(0);

    /// Left Shift only; the implicit modifier of shifted characters.
    pub const SHIFT: ModifierFlags = ModifierFlags(Self::LEFT_SHIFT);

    /// Returns the raw bitfield.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if no modifier bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every bit in `other` is also set in `self`.
    pub fn contains(self, other: ModifierFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if either Shift modifier is active.
    pub fn shift(self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }
}

impl std::ops::BitOr for ModifierFlags {
    type Output = ModifierFlags;

    fn bitor(self, rhs: ModifierFlags) -> ModifierFlags {
        ModifierFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ModifierFlags {
    fn bitor_assign(&mut self, rhs: ModifierFlags) {
        self.0 |= rhs.0;
    }
}

/// One physical key press together with the modifiers it requires.
///
/// `'A'` is `{ modifier: SHIFT, keycode: KeyA }`; `'a'` has no modifier.
/// A `keycode` of [`HidKeyCode::Unknown`] means "no mapping found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HidKey {
    pub modifier: ModifierFlags,
    pub keycode: HidKeyCode,
}

impl HidKey {
    /// The "no mapping" sentinel: `{0, 0}`.
    pub const UNMAPPED: HidKey = HidKey {
        modifier: ModifierFlags::NONE,
        keycode: HidKeyCode::Unknown,
    };

    /// A key pressed without any modifier.
    pub const fn plain(keycode: HidKeyCode) -> Self {
        Self {
            modifier: ModifierFlags::NONE,
            keycode,
        }
    }

    /// A key pressed while Left Shift is held.
    pub const fn shifted(keycode: HidKeyCode) -> Self {
        Self {
            modifier: ModifierFlags::SHIFT,
            keycode,
        }
    }

    /// Returns `false` for the no-mapping sentinel.
    pub fn is_mapped(self) -> bool {
        self.keycode != HidKeyCode::Unknown
    }
}

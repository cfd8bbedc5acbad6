//! Name and character tables used to resolve command tokens into HID keys.
//!
//! Three lookups live here:
//!
//! - the **modifier table** (`"CTRL"` → Left Ctrl bit),
//! - the **special-key table** (`"ENTER"` → `Enter` usage, no modifier),
//! - the **ASCII rule** (`'!'` → `Digit1` + Left Shift, US QWERTY layout).
//!
//! Names are case-sensitive and upper-case by convention.  Several names
//! exist in both tables (`SHIFT`, `CTRL`, `WIN`, ...).  Which table wins
//! depends on context, see [`KeySymbolTables::resolve_chord_token`].

use std::collections::HashMap;

use super::hid::{HidKey, HidKeyCode, ModifierFlags};

/// Modifier names and the bit each one sets.
const MODIFIER_NAMES: &[(&str, u8)] = &[
    ("SHIFT", ModifierFlags::LEFT_SHIFT),
    ("LSHIFT", ModifierFlags::LEFT_SHIFT),
    ("RSHIFT", ModifierFlags::RIGHT_SHIFT),
    ("CTRL", ModifierFlags::LEFT_CTRL),
    ("LCTRL", ModifierFlags::LEFT_CTRL),
    ("RCTRL", ModifierFlags::RIGHT_CTRL),
    ("ALT", ModifierFlags::LEFT_ALT),
    ("LALT", ModifierFlags::LEFT_ALT),
    ("RALT", ModifierFlags::RIGHT_ALT),
    ("GUI", ModifierFlags::LEFT_GUI),
    ("WIN", ModifierFlags::LEFT_GUI),
    ("LWIN", ModifierFlags::LEFT_GUI),
    ("RWIN", ModifierFlags::RIGHT_GUI),
    ("CMD", ModifierFlags::LEFT_GUI),
    ("LCMD", ModifierFlags::LEFT_GUI),
    ("RCMD", ModifierFlags::RIGHT_GUI),
];

/// Named keys.  Only `PLUS` carries an implicit modifier.
const SPECIAL_NAMES: &[(&str, HidKey)] = &[
    ("ESC", HidKey::plain(HidKeyCode::Escape)),
    ("F1", HidKey::plain(HidKeyCode::F1)),
    ("F2", HidKey::plain(HidKeyCode::F2)),
    ("F3", HidKey::plain(HidKeyCode::F3)),
    ("F4", HidKey::plain(HidKeyCode::F4)),
    ("F5", HidKey::plain(HidKeyCode::F5)),
    ("F6", HidKey::plain(HidKeyCode::F6)),
    ("F7", HidKey::plain(HidKeyCode::F7)),
    ("F8", HidKey::plain(HidKeyCode::F8)),
    ("F9", HidKey::plain(HidKeyCode::F9)),
    ("F10", HidKey::plain(HidKeyCode::F10)),
    ("F11", HidKey::plain(HidKeyCode::F11)),
    ("F12", HidKey::plain(HidKeyCode::F12)),
    ("F13", HidKey::plain(HidKeyCode::F13)),
    ("F14", HidKey::plain(HidKeyCode::F14)),
    ("F15", HidKey::plain(HidKeyCode::F15)),
    ("F16", HidKey::plain(HidKeyCode::F16)),
    ("F17", HidKey::plain(HidKeyCode::F17)),
    ("F18", HidKey::plain(HidKeyCode::F18)),
    ("F19", HidKey::plain(HidKeyCode::F19)),
    ("F20", HidKey::plain(HidKeyCode::F20)),
    ("F21", HidKey::plain(HidKeyCode::F21)),
    ("F22", HidKey::plain(HidKeyCode::F22)),
    ("F23", HidKey::plain(HidKeyCode::F23)),
    ("F24", HidKey::plain(HidKeyCode::F24)),
    ("BACKSPACE", HidKey::plain(HidKeyCode::Backspace)),
    ("DEL", HidKey::plain(HidKeyCode::Delete)),
    ("DELETE", HidKey::plain(HidKeyCode::Delete)),
    ("TAB", HidKey::plain(HidKeyCode::Tab)),
    ("ENTER", HidKey::plain(HidKeyCode::Enter)),
    ("SHIFT", HidKey::plain(HidKeyCode::ShiftLeft)),
    ("LSHIFT", HidKey::plain(HidKeyCode::ShiftLeft)),
    ("RSHIFT", HidKey::plain(HidKeyCode::ShiftRight)),
    ("CTRL", HidKey::plain(HidKeyCode::ControlLeft)),
    ("LCTRL", HidKey::plain(HidKeyCode::ControlLeft)),
    ("RCTRL", HidKey::plain(HidKeyCode::ControlRight)),
    ("ALT", HidKey::plain(HidKeyCode::AltLeft)),
    ("LALT", HidKey::plain(HidKeyCode::AltLeft)),
    ("RALT", HidKey::plain(HidKeyCode::AltRight)),
    ("GUI", HidKey::plain(HidKeyCode::MetaLeft)),
    ("WIN", HidKey::plain(HidKeyCode::MetaLeft)),
    ("LWIN", HidKey::plain(HidKeyCode::MetaLeft)),
    ("RWIN", HidKey::plain(HidKeyCode::MetaRight)),
    ("CMD", HidKey::plain(HidKeyCode::MetaLeft)),
    ("LCMD", HidKey::plain(HidKeyCode::MetaLeft)),
    ("RCMD", HidKey::plain(HidKeyCode::MetaRight)),
    ("SPACE", HidKey::plain(HidKeyCode::Space)),
    ("PLUS", HidKey::shifted(HidKeyCode::Equal)),
    ("PRTSCRN", HidKey::plain(HidKeyCode::PrintScreen)),
    ("SCRLLOCK", HidKey::plain(HidKeyCode::ScrollLock)),
    ("PAUSE", HidKey::plain(HidKeyCode::Pause)),
    ("INSERT", HidKey::plain(HidKeyCode::Insert)),
    ("HOME", HidKey::plain(HidKeyCode::Home)),
    ("END", HidKey::plain(HidKeyCode::End)),
    ("PAGEUP", HidKey::plain(HidKeyCode::PageUp)),
    ("PAGEDOWN", HidKey::plain(HidKeyCode::PageDown)),
    ("UP", HidKey::plain(HidKeyCode::ArrowUp)),
    ("DOWN", HidKey::plain(HidKeyCode::ArrowDown)),
    ("LEFT", HidKey::plain(HidKeyCode::ArrowLeft)),
    ("RIGHT", HidKey::plain(HidKeyCode::ArrowRight)),
    ("KP1", HidKey::plain(HidKeyCode::Numpad1)),
    ("KP2", HidKey::plain(HidKeyCode::Numpad2)),
    ("KP3", HidKey::plain(HidKeyCode::Numpad3)),
    ("KP4", HidKey::plain(HidKeyCode::Numpad4)),
    ("KP5", HidKey::plain(HidKeyCode::Numpad5)),
    ("KP6", HidKey::plain(HidKeyCode::Numpad6)),
    ("KP7", HidKey::plain(HidKeyCode::Numpad7)),
    ("KP8", HidKey::plain(HidKeyCode::Numpad8)),
    ("KP9", HidKey::plain(HidKeyCode::Numpad9)),
    ("KP0", HidKey::plain(HidKeyCode::Numpad0)),
    ("KPDIV", HidKey::plain(HidKeyCode::NumpadDivide)),
    ("KPMUL", HidKey::plain(HidKeyCode::NumpadMultiply)),
    ("KPSUB", HidKey::plain(HidKeyCode::NumpadSubtract)),
    ("KPADD", HidKey::plain(HidKeyCode::NumpadAdd)),
    ("KPENTER", HidKey::plain(HidKeyCode::NumpadEnter)),
    ("KP.", HidKey::plain(HidKeyCode::NumpadDecimal)),
    ("KP=", HidKey::plain(HidKeyCode::NumpadEqual)),
    ("KP,", HidKey::plain(HidKeyCode::NumpadComma)),
];

/// What a single command token resolved to.
///
/// Tokens are classified once; the compiler then works on these variants
/// rather than on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    /// `a`–`z` or `A`–`Z`.
    Letter(HidKey),
    /// `0`–`9`.
    Digit(HidKey),
    /// One of the US QWERTY punctuation characters.
    Punctuation(HidKey),
    /// A name from the special-key table.
    SpecialKey(HidKey),
    /// A name from the modifier table.
    Modifier(ModifierFlags),
    /// Nothing matched; the token produces no key.
    Unmapped,
}

impl Symbol {
    /// Returns the key to place in a report slot, if this symbol is one.
    ///
    /// Modifiers and unmapped tokens return `None`.
    pub fn key(self) -> Option<HidKey> {
        match self {
            Symbol::Letter(k) | Symbol::Digit(k) | Symbol::Punctuation(k) | Symbol::SpecialKey(k) => {
                Some(k)
            }
            Symbol::Modifier(_) | Symbol::Unmapped => None,
        }
    }
}

/// Immutable lookup tables for command tokens.
///
/// Build once at startup with [`KeySymbolTables::new`] and share by reference.
#[derive(Debug, Clone)]
pub struct KeySymbolTables {
    modifiers: HashMap<&'static str, ModifierFlags>,
    specials: HashMap<&'static str, HidKey>,
}

impl KeySymbolTables {
    /// Builds the US QWERTY tables.
    pub fn new() -> Self {
        let modifiers = MODIFIER_NAMES
            .iter()
            .map(|&(name, bit)| (name, ModifierFlags(bit)))
            .collect();
        let specials = SPECIAL_NAMES.iter().copied().collect();
        Self {
            modifiers,
            specials,
        }
    }

    /// Looks up a modifier name such as `"CTRL"` or `"RCMD"`.
    pub fn lookup_modifier(&self, name: &str) -> Option<ModifierFlags> {
        self.modifiers.get(name).copied()
    }

    /// Looks up a special-key name such as `"ENTER"` or `"KP."`.
    pub fn lookup_special(&self, name: &str) -> Option<HidKey> {
        self.specials.get(name).copied()
    }

    /// Maps a character to its key on a US QWERTY keyboard.
    ///
    /// Never fails: characters outside the supported set return
    /// [`HidKey::UNMAPPED`].
    pub fn ascii_to_hid(&self, ch: char) -> HidKey {
        classify_char(ch).key().unwrap_or(HidKey::UNMAPPED)
    }

    /// Resolves one `+`-separated token of a chord.
    ///
    /// Tie-break rule: the modifier table is consulted first, so `CTRL` in
    /// `CTRL+C` sets the Left Ctrl bit instead of occupying a key slot with
    /// the `ControlLeft` usage.  Then the special-key table, then the ASCII
    /// rule for single-character tokens.
    pub fn resolve_chord_token(&self, token: &str) -> Symbol {
        if let Some(bits) = self.lookup_modifier(token) {
            return Symbol::Modifier(bits);
        }
        if let Some(key) = self.lookup_special(token) {
            return Symbol::SpecialKey(key);
        }
        match single_char(token) {
            Some(ch) => classify_char(ch),
            None => Symbol::Unmapped,
        }
    }

    /// Resolves a whole space-delimited segment that is not a chord.
    ///
    /// Only the special-key table applies here: a bare `SHIFT` presses the
    /// Left Shift key itself rather than acting as a modifier.  Returns
    /// `None` when the segment should be typed as literal text.
    pub fn resolve_segment(&self, segment: &str) -> Option<HidKey> {
        self.lookup_special(segment)
    }
}

impl Default for KeySymbolTables {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the only character of `token`, or `None` if it has zero or several.
fn single_char(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Some(ch),
        _ => None,
    }
}

/// Applies the ASCII rule to one character.
pub fn classify_char(ch: char) -> Symbol {
    match ch {
        'a'..='z' => Symbol::Letter(HidKey::plain(letter_key(ch as u8 - b'a'))),
        'A'..='Z' => Symbol::Letter(HidKey::shifted(letter_key(ch as u8 - b'A'))),
        '1'..='9' => Symbol::Digit(HidKey::plain(HidKeyCode::DIGIT_ROW[(ch as u8 - b'1') as usize])),
        '0' => Symbol::Digit(HidKey::plain(HidKeyCode::Digit0)),
        _ => match punctuation_key(ch) {
            Some(key) => Symbol::Punctuation(key),
            None => Symbol::Unmapped,
        },
    }
}

fn letter_key(offset: u8) -> HidKeyCode {
    HidKeyCode::LETTERS[offset as usize]
}

fn punctuation_key(ch: char) -> Option<HidKey> {
    use HidKeyCode::*;

    let key = match ch {
        '!' => HidKey::shifted(Digit1),
        '@' => HidKey::shifted(Digit2),
        '#' => HidKey::shifted(Digit3),
        '$' => HidKey::shifted(Digit4),
        '%' => HidKey::shifted(Digit5),
        '^' => HidKey::shifted(Digit6),
        '&' => HidKey::shifted(Digit7),
        '*' => HidKey::shifted(Digit8),
        '(' => HidKey::shifted(Digit9),
        ')' => HidKey::shifted(Digit0),
        '-' => HidKey::plain(Minus),
        '_' => HidKey::shifted(Minus),
        '=' => HidKey::plain(Equal),
        '+' => HidKey::shifted(Equal),
        '[' => HidKey::plain(BracketLeft),
        '{' => HidKey::shifted(BracketLeft),
        ']' => HidKey::plain(BracketRight),
        '}' => HidKey::shifted(BracketRight),
        '\\' => HidKey::plain(Backslash),
        '|' => HidKey::shifted(Backslash),
        ';' => HidKey::plain(Semicolon),
        ':' => HidKey::shifted(Semicolon),
        '\'' => HidKey::plain(Quote),
        '"' => HidKey::shifted(Quote),
        '`' => HidKey::plain(Backquote),
        '~' => HidKey::shifted(Backquote),
        ',' => HidKey::plain(Comma),
        '<' => HidKey::shifted(Comma),
        '.' => HidKey::plain(Period),
        '>' => HidKey::shifted(Period),
        '/' => HidKey::plain(Slash),
        '?' => HidKey::shifted(Slash),
        _ => return None,
    };
    Some(key)
}

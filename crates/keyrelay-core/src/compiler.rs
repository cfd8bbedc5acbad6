//! Keystroke sequence compiler.
//!
//! Turns a typed command such as `"CTRL+ALT+DEL"`, `"Hello World"` or `"F5"`
//! into keyboard reports.  The grammar:
//!
//! - The input is split on single spaces.  Empty segments (from repeated
//!   spaces) produce nothing.
//! - A segment containing `+` is a **chord**: every `+`-separated token is
//!   resolved and the whole chord becomes one report.
//! - Any other segment is first matched against the special-key names
//!   (`ENTER`, `F5`, ...).  If that fails, each character is typed on its own.
//!
//! Compilation is lazy and strictly left to right.  Nothing is ever reported
//! as an error: unmapped characters are skipped and keys beyond the sixth in
//! a chord are dropped.
//!
//! # Example
//!
//! ```rust
//! use keyrelay_core::compiler::KeystrokeCompiler;
//! use keyrelay_core::keymap::KeySymbolTables;
//!
//! let tables = KeySymbolTables::new();
//! let compiler = KeystrokeCompiler::new(&tables);
//!
//! // "Hi" is two keystrokes, each a press report followed by a release.
//! assert_eq!(compiler.compile("Hi").count(), 2);
//! assert_eq!(compiler.compile("Hi").reports().count(), 4);
//! ```

use std::str::{Chars, Split};

use tracing::trace;

use crate::keymap::{HidKey, KeySymbolTables, ModifierFlags, Symbol};
use crate::report::{KeyboardReport, MAX_KEYS};

/// One logical key event: a press report, always followed by a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keystroke {
    press: KeyboardReport,
}

impl Keystroke {
    fn single(key: HidKey) -> Self {
        Self {
            press: KeyboardReport::single(key),
        }
    }

    /// The key-down report.
    pub fn press(&self) -> KeyboardReport {
        self.press
    }

    /// The report that lets go of every key.
    pub fn release(&self) -> KeyboardReport {
        KeyboardReport::RELEASE
    }
}

/// Compiles command strings against a borrowed set of symbol tables.
#[derive(Debug, Clone, Copy)]
pub struct KeystrokeCompiler<'t> {
    tables: &'t KeySymbolTables,
}

impl<'t> KeystrokeCompiler<'t> {
    pub fn new(tables: &'t KeySymbolTables) -> Self {
        Self { tables }
    }

    /// Returns a lazy iterator over the keystrokes of `input`.
    pub fn compile<'i>(&self, input: &'i str) -> Keystrokes<'t, 'i> {
        Keystrokes {
            tables: self.tables,
            segments: input.split(' '),
            text: None,
        }
    }
}

/// Lazy keystroke sequence produced by [`KeystrokeCompiler::compile`].
pub struct Keystrokes<'t, 'i> {
    tables: &'t KeySymbolTables,
    segments: Split<'i, char>,
    /// Remaining characters of the literal-text segment being typed.
    text: Option<Chars<'i>>,
}

impl<'t, 'i> Keystrokes<'t, 'i> {
    /// Flattens the sequence into reports: press, release, press, release, ...
    pub fn reports(self) -> Reports<'t, 'i> {
        Reports {
            keystrokes: self,
            release_pending: false,
        }
    }

    fn chord(&self, segment: &str) -> Keystroke {
        let mut modifier = ModifierFlags::NONE;
        let mut keycodes = [0u8; MAX_KEYS];
        let mut used = 0;

        for token in segment.split('+').map(str::trim) {
            match self.tables.resolve_chord_token(token) {
                Symbol::Modifier(bits) => modifier |= bits,
                symbol => {
                    let Some(key) = symbol.key() else {
                        continue;
                    };
                    if used == MAX_KEYS {
                        trace!(token, "chord already holds {MAX_KEYS} keys; dropping");
                        continue;
                    }
                    keycodes[used] = key.keycode.as_u8();
                    modifier |= key.modifier;
                    used += 1;
                }
            }
        }

        Keystroke {
            press: KeyboardReport {
                modifier: modifier.bits(),
                keycodes,
            },
        }
    }
}

impl Iterator for Keystrokes<'_, '_> {
    type Item = Keystroke;

    fn next(&mut self) -> Option<Keystroke> {
        loop {
            if let Some(chars) = &mut self.text {
                for ch in chars.by_ref() {
                    let key = self.tables.ascii_to_hid(ch);
                    if key.is_mapped() {
                        return Some(Keystroke::single(key));
                    }
                    trace!(?ch, "no key for character; skipping");
                }
                self.text = None;
            }

            let segment = self.segments.next()?.trim();
            if segment.is_empty() {
                continue;
            }
            if segment.contains('+') {
                return Some(self.chord(segment));
            }
            if let Some(key) = self.tables.resolve_segment(segment) {
                return Some(Keystroke::single(key));
            }
            self.text = Some(segment.chars());
        }
    }
}

/// Report-level view of a keystroke sequence, see [`Keystrokes::reports`].
pub struct Reports<'t, 'i> {
    keystrokes: Keystrokes<'t, 'i>,
    release_pending: bool,
}

impl Iterator for Reports<'_, '_> {
    type Item = KeyboardReport;

    fn next(&mut self) -> Option<KeyboardReport> {
        if self.release_pending {
            self.release_pending = false;
            return Some(KeyboardReport::RELEASE);
        }
        let keystroke = self.keystrokes.next()?;
        self.release_pending = true;
        Some(keystroke.press())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::HidKeyCode;

    fn presses(input: &str) -> Vec<KeyboardReport> {
        let tables = KeySymbolTables::new();
        KeystrokeCompiler::new(&tables)
            .compile(input)
            .map(|k| k.press())
            .collect()
    }

    fn code(key: HidKeyCode) -> u8 {
        key.as_u8()
    }

    #[test]
    fn test_empty_input_compiles_to_nothing() {
        assert!(presses("").is_empty());
        assert!(presses("   ").is_empty());
    }

    #[test]
    fn test_uppercase_letter_is_one_shifted_press() {
        // Arrange / Act
        let reports = presses("A");

        // Assert
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].modifier, ModifierFlags::LEFT_SHIFT);
        assert_eq!(reports[0].keycodes, [code(HidKeyCode::KeyA), 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_ctrl_alt_del_is_a_single_chord() {
        let reports = presses("CTRL+ALT+DEL");

        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].modifier,
            ModifierFlags::LEFT_CTRL | ModifierFlags::LEFT_ALT
        );
        assert_eq!(reports[0].keycodes, [code(HidKeyCode::Delete), 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_text_types_one_keystroke_per_character_in_order() {
        let reports = presses("Hi  There");

        let keys: Vec<u8> = reports.iter().map(|r| r.keycodes[0]).collect();
        let expected: Vec<u8> = [
            HidKeyCode::KeyH,
            HidKeyCode::KeyI,
            HidKeyCode::KeyT,
            HidKeyCode::KeyH,
            HidKeyCode::KeyE,
            HidKeyCode::KeyR,
            HidKeyCode::KeyE,
        ]
        .into_iter()
        .map(code)
        .collect();
        assert_eq!(keys, expected);
        assert_eq!(reports[0].modifier, ModifierFlags::LEFT_SHIFT);
        assert_eq!(reports[1].modifier, 0);
    }

    #[test]
    fn test_special_key_segment_is_one_keystroke() {
        let reports = presses("F5");
        assert_eq!(reports, vec![KeyboardReport::single(HidKey::plain(HidKeyCode::F5))]);
    }

    #[test]
    fn test_special_key_with_modifier_keeps_modifier() {
        let reports = presses("PLUS");
        assert_eq!(reports[0].modifier, ModifierFlags::LEFT_SHIFT);
        assert_eq!(reports[0].keycodes[0], code(HidKeyCode::Equal));
    }

    #[test]
    fn test_segments_are_trimmed_before_lookup() {
        // Arrange: only spaces split segments, so tabs and newlines stay attached
        let reports = presses("\tENTER\n a\t \t");

        // Assert: "\tENTER\n" is the ENTER key, and a whitespace-only segment adds nothing
        assert_eq!(
            reports,
            vec![
                KeyboardReport::single(HidKey::plain(HidKeyCode::Enter)),
                KeyboardReport::single(HidKey::plain(HidKeyCode::KeyA)),
            ]
        );
    }

    #[test]
    fn test_bare_shift_presses_shift_key_as_keycode() {
        let reports = presses("SHIFT");
        assert_eq!(reports[0].modifier, 0);
        assert_eq!(reports[0].keycodes[0], code(HidKeyCode::ShiftLeft));
    }

    #[test]
    fn test_unknown_word_is_typed_as_text() {
        // "Enter" is not the special name "ENTER", so it is typed letter by letter.
        assert_eq!(presses("Enter").len(), 5);
    }

    #[test]
    fn test_unmapped_characters_are_skipped() {
        let reports = presses("a\u{e9}b");
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn test_chord_caps_keys_at_six_and_drops_the_rest() {
        // Arrange: seven keys, the last one shifted
        let reports = presses("a+b+c+d+e+f+G");

        // Assert: only a..f survive, and G's implicit shift is dropped with it
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].modifier, 0);
        let expected: Vec<u8> = HidKeyCode::LETTERS[..6].iter().map(|&k| code(k)).collect();
        assert_eq!(reports[0].keycodes.to_vec(), expected);
    }

    #[test]
    fn test_chord_accumulates_implicit_shift_from_characters() {
        let reports = presses("CTRL+!");
        assert_eq!(
            reports[0].modifier,
            ModifierFlags::LEFT_CTRL | ModifierFlags::LEFT_SHIFT
        );
        assert_eq!(reports[0].keycodes[0], code(HidKeyCode::Digit1));
    }

    #[test]
    fn test_chord_tokens_are_trimmed_and_unknown_tokens_ignored() {
        let reports = presses("CTRL+\tc\t+NOPE+");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].modifier, ModifierFlags::LEFT_CTRL);
        assert_eq!(reports[0].keycodes, [code(HidKeyCode::KeyC), 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_modifier_only_chord_still_emits_a_report() {
        let reports = presses("CTRL+ALT");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].keycodes, [0; 6]);
        assert_eq!(
            reports[0].modifier,
            ModifierFlags::LEFT_CTRL | ModifierFlags::LEFT_ALT
        );
    }

    #[test]
    fn test_reports_alternate_press_and_release() {
        // Arrange
        let tables = KeySymbolTables::new();
        let compiler = KeystrokeCompiler::new(&tables);

        // Act
        let reports: Vec<KeyboardReport> = compiler.compile("ab ENTER").reports().collect();

        // Assert
        assert_eq!(reports.len(), 6);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.is_release(), i % 2 == 1, "report {i} in wrong phase");
        }
    }

    #[test]
    fn test_mixed_segments_keep_left_to_right_order() {
        let reports = presses("x CTRL+v ENTER");
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].keycodes[0], code(HidKeyCode::KeyX));
        assert_eq!(reports[1].keycodes[0], code(HidKeyCode::KeyV));
        assert_eq!(reports[2].keycodes[0], code(HidKeyCode::Enter));
    }
}

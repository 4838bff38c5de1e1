//! Scancode dictionaries
//!
//! A dictionary is a flat table of 256 slots. Each populated slot carries the
//! base, shifted, alted and controlled emissions for one physical key, plus
//! an optional tail character for keys that resolve to an ESC sequence (the
//! arrow keys). Emissions are UTF-8 strings so national layouts can produce
//! characters outside ASCII; an empty string suppresses the key.

use crate::KeyboardError;

/// One key's emissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySlot {
    pub base: &'static str,
    pub shifted: &'static str,
    pub alted: &'static str,
    pub controlled: &'static str,
    /// Second byte sent after ESC when the selected emission is ESC itself.
    pub escape_tail: Option<&'static str>,
}

type KeyDef = (u8, [&'static str; 4], Option<&'static str>);

/// The scancode sets a layout assigns to its modifier keys.
///
/// An empty release set makes the modifier sticky: it latches on press and
/// clears after the next non-modifier key (or on a second press).
#[derive(Debug, Clone, Copy)]
pub struct ModifierKeys {
    pub shift_press: &'static [u8],
    pub shift_release: &'static [u8],
    pub ctrl_press: &'static [u8],
    pub ctrl_release: &'static [u8],
    pub alt_press: &'static [u8],
    pub alt_release: &'static [u8],
    pub caps_lock: &'static [u8],
}

/// A complete keyboard layout: modifier assignments, the 256-slot key table,
/// and the layout's custom ASCII→EBCDIC character conversions.
#[derive(Debug, Clone)]
pub struct Dictionary {
    name: &'static str,
    modifiers: ModifierKeys,
    slots: Vec<Option<KeySlot>>,
    custom_conversions: &'static [(u8, u8)],
}

impl Dictionary {
    /// US 5250 typewriter layout.
    pub fn us() -> Self {
        Self::from_defs("us", MODIFIERS_5250, US_KEYS, &[])
    }

    /// Spanish 5250 typewriter layout. Carries character-generator overrides
    /// for the glyphs cp037 places at nonstandard codes.
    pub fn es() -> Self {
        Self::from_defs("es", MODIFIERS_5250, ES_KEYS, ES_CONVERSIONS)
    }

    /// Look a layout up by its configuration name.
    pub fn by_name(name: &str) -> Result<Self, KeyboardError> {
        match name {
            "us" => Ok(Self::us()),
            "es" => Ok(Self::es()),
            other => Err(KeyboardError::UnknownDictionary(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn modifiers(&self) -> &ModifierKeys {
        &self.modifiers
    }

    pub fn slot(&self, scancode: u8) -> Option<&KeySlot> {
        self.slots[scancode as usize].as_ref()
    }

    /// Per-session ASCII→EBCDIC overrides this layout requires.
    pub fn custom_conversions(&self) -> &'static [(u8, u8)] {
        self.custom_conversions
    }

    fn from_defs(
        name: &'static str,
        modifiers: ModifierKeys,
        defs: &[KeyDef],
        custom_conversions: &'static [(u8, u8)],
    ) -> Self {
        let mut slots = vec![None; 256];
        for &(scancode, [base, shifted, alted, controlled], escape_tail) in defs {
            slots[scancode as usize] = Some(KeySlot {
                base,
                shifted,
                alted,
                controlled,
                escape_tail,
            });
        }
        Self {
            name,
            modifiers,
            slots,
            custom_conversions,
        }
    }
}

const ESC: &str = "\x1b";
const BS: &str = "\x08";
const TAB: &str = "\x09";
const CR: &str = "\x0d";

/// Modifier assignments shared by the 5250 typewriter keyboards. The ALT key
/// reports no break code, so it is the sticky one.
static MODIFIERS_5250: ModifierKeys = ModifierKeys {
    shift_press: &[0x54],
    shift_release: &[0xD4],
    ctrl_press: &[0x57, 0x56],
    ctrl_release: &[0xD7, 0xD6],
    alt_press: &[0x68],
    alt_release: &[],
    caps_lock: &[0x7E],
};

static US_KEYS: &[KeyDef] = &[
    // function block
    (0x7C, [ESC, ESC, "", ""], None), // F1
    (0x6F, [ESC, ESC, "", ""], None), // F2
    // row 1
    (0x3E, ["`", "~", "`", ""], None),
    (0x31, ["1", "|", "", ""], None),
    (0x32, ["2", "@", "", ""], None),
    (0x33, ["3", "#", "", ""], None),
    (0x34, ["4", "$", "", ""], None),
    (0x35, ["5", "%", "", ""], None),
    (0x36, ["6", "^", "", ""], None),
    (0x37, ["7", "&", "", ""], None),
    (0x38, ["8", "*", "", ""], None),
    (0x39, ["9", "(", "", ""], None),
    (0x3A, ["0", ")", "", ""], None),
    (0x3B, ["-", "_", "", "\x1c"], None),
    (0x3C, ["=", "+", "", ""], None),
    (0x3D, [BS, BS, "", ""], None),
    (0x4B, ["", "", "", ""], None),
    (0x4C, ["", "", "", ""], None), // DUP
    // row 2
    (0x20, [TAB, TAB, "", ""], None),
    (0x21, ["q", "Q", "", "\x11"], None),
    (0x22, ["w", "W", "", "\x17"], None),
    (0x23, ["e", "E", "", "\x05"], None),
    (0x24, ["r", "R", "", "\x12"], None),
    (0x25, ["t", "T", "", "\x14"], None),
    (0x26, ["y", "Y", "", "\x19"], None),
    (0x27, ["u", "U", "", "\x15"], None),
    (0x28, ["i", "I", "", "\x09"], None),
    (0x29, ["o", "O", "", "\x0f"], None),
    (0x2A, ["p", "P", "", "\x10"], None),
    (0x2B, ["¢", "!", "", ESC], None),
    (0x2C, ["\\", "|", "", "\x1d"], None),
    (0x2D, [CR, CR, "", ""], None),
    (0x47, ["7", "7", "", ""], None),
    (0x48, ["8", "8", ESC, ESC], Some("A")), // numpad 8 / up arrow
    (0x49, ["9", "9", "", ""], None),
    (0x4E, ["", "", "", ""], None),
    // row 3
    (0x11, ["a", "A", "", "\x01"], None),
    (0x12, ["s", "S", "", "\x13"], None),
    (0x13, ["d", "D", "", "\x04"], None),
    (0x14, ["f", "F", "", "\x06"], None),
    (0x15, ["g", "G", "", "\x07"], None),
    (0x16, ["h", "H", "", "\x08"], None),
    (0x17, ["j", "J", "", "\x0a"], None),
    (0x18, ["k", "K", "", "\x0b"], None),
    (0x19, ["l", "L", "", "\x0c"], None),
    (0x1A, [";", ":", "", ""], None),
    (0x1B, ["'", "\"", "", ESC], None),
    (0x1C, ["{", "}", "", "\x1d"], None),
    (0x44, ["4", "4", ESC, ESC], Some("D")), // numpad 4 / left arrow
    (0x45, ["5", "5", "", ""], None),
    (0x46, ["6", "6", ESC, ESC], Some("C")), // numpad 6 / right arrow
    (0x4D, [CR, "", "", ""], None),
    // row 4
    (0x0E, ["<", ">", "|", ""], None),
    (0x01, ["z", "Z", "", "\x1a"], None),
    (0x02, ["x", "X", "", "\x18"], None),
    (0x03, ["c", "C", "", "\x03"], None),
    (0x04, ["v", "V", "", "\x16"], None),
    (0x05, ["b", "B", "", "\x02"], None),
    (0x06, ["n", "N", "", "\x0e"], None),
    (0x07, ["m", "M", "", "\x0d"], None),
    (0x08, [",", "<", "", ""], None),
    (0x09, [".", ">", "", ""], None),
    (0x0A, ["/", "?", "", "\x1f"], None),
    (0x0C, ["", "", "", ""], None),
    (0x41, ["1", "1", "", ""], None),
    (0x42, ["2", "2", ESC, ESC], Some("B")), // numpad 2 / down arrow
    (0x43, ["3", "3", "", ""], None),
    (0x40, ["0", "0", "", ""], None),
    (0x4A, [",", "", "", ""], None),
    // row 5
    (0x0F, [" ", " ", "", ""], None),
    // dedicated arrow block
    (0x63, [ESC, ESC, ESC, ""], Some("A")),
    (0x61, [ESC, ESC, ESC, ""], Some("D")),
    (0x60, [ESC, ESC, ESC, ""], Some("B")),
    (0x6A, [ESC, ESC, ESC, ""], Some("C")),
];

static ES_KEYS: &[KeyDef] = &[
    // function block
    (0x7C, [ESC, ESC, "", ""], None), // F1
    (0x6F, [ESC, ESC, "", ""], None), // F2
    (0x6C, ["", "", "", ""], None),
    (0x6D, ["", "", "", ""], None),
    (0x6E, ["", "", "", ""], None),
    (0x7D, ["", "", "", ""], None),
    (0x71, ["", "", "", ""], None),
    (0x70, ["", "", "", ""], None),
    (0x72, ["", "", "", ""], None),
    (0x73, ["", "", "", ""], None),
    // row 1
    (0x3E, ["º", "ª", "\\", ""], None),
    (0x31, ["1", "!", "|", ""], None),
    (0x32, ["2", "\"", "@", ""], None),
    (0x33, ["3", "·", "#", ""], None),
    (0x34, ["4", "$", "~", ""], None),
    (0x35, ["5", "%", "½", ""], None),
    (0x36, ["6", "&", "", ""], None),
    (0x37, ["7", "/", "", ""], None),
    (0x38, ["8", "(", "", ""], None),
    (0x39, ["9", ")", "", ""], None),
    (0x3A, ["0", "=", "", ""], None),
    (0x3B, ["'", "?", "", "\x1c"], None),
    (0x3C, ["¡", "¿", "", ""], None),
    (0x3D, [BS, BS, "", ""], None),
    (0x4B, ["", "", "", ""], None),
    (0x4C, ["", "", "", ""], None), // DUP
    // row 2
    (0x20, [TAB, TAB, "", ""], None),
    (0x21, ["q", "Q", "", "\x11"], None),
    (0x22, ["w", "W", "", "\x17"], None),
    (0x23, ["e", "E", "", "\x05"], None),
    (0x24, ["r", "R", "", "\x12"], None),
    (0x25, ["t", "T", "", "\x14"], None),
    (0x26, ["y", "Y", "", "\x19"], None),
    (0x27, ["u", "U", "", "\x15"], None),
    (0x28, ["i", "I", "", "\x09"], None),
    (0x29, ["o", "O", "", "\x0f"], None),
    (0x2A, ["p", "P", "", "\x10"], None),
    (0x2B, ["`", "^", "[", ESC], None),
    (0x2C, ["+", "*", "]", "\x1d"], None),
    (0x2D, [CR, CR, "", ""], None),
    (0x47, ["7", "7", "", ""], None),
    (0x48, ["8", "8", ESC, ESC], Some("A")), // numpad 8 / up arrow
    (0x49, ["9", "9", "", ""], None),
    (0x4E, ["", "", "", ""], None),
    // row 3
    (0x11, ["a", "A", "", "\x01"], None),
    (0x12, ["s", "S", "", "\x13"], None),
    (0x13, ["d", "D", "", "\x04"], None),
    (0x14, ["f", "F", "", "\x06"], None),
    (0x15, ["g", "G", "", "\x07"], None),
    (0x16, ["h", "H", "", "\x08"], None),
    (0x17, ["j", "J", "", "\x0a"], None),
    (0x18, ["k", "K", "", "\x0b"], None),
    (0x19, ["l", "L", "", "\x0c"], None),
    (0x1A, ["ñ", "Ñ", "", ""], None),
    (0x1B, ["´", "¨", "{", ESC], None),
    (0x1C, ["ç", "Ç", "}", "\x1d"], None),
    (0x44, ["4", "4", ESC, ESC], Some("D")), // numpad 4 / left arrow
    (0x45, ["5", "5", "", ""], None),
    (0x46, ["6", "6", ESC, ESC], Some("C")), // numpad 6 / right arrow
    (0x4D, [CR, "", "", ""], None),
    // row 4
    (0x0E, ["<", ">", "|", ""], None),
    (0x01, ["z", "Z", "", "\x1a"], None),
    (0x02, ["x", "X", "", "\x18"], None),
    (0x03, ["c", "C", "", "\x03"], None),
    (0x04, ["v", "V", "", "\x16"], None),
    (0x05, ["b", "B", "", "\x02"], None),
    (0x06, ["n", "N", "", "\x0e"], None),
    (0x07, ["m", "M", "", "\x0d"], None),
    (0x08, [",", ";", "", ""], None),
    (0x09, [".", ":", "", ""], None),
    (0x0A, ["-", "_", "", "\x1f"], None),
    (0x0C, ["", "", "", ""], None),
    (0x41, ["1", "1", "", ""], None),
    (0x42, ["2", "2", ESC, ESC], Some("B")), // numpad 2 / down arrow
    (0x43, ["3", "3", "", ""], None),
    (0x40, ["0", "0", "", ""], None),
    (0x4A, [",", "", "", ""], None),
    // row 5
    (0x0F, [" ", " ", "", ""], None),
    // dedicated arrow block
    (0x63, [ESC, ESC, ESC, ""], Some("A")),
    (0x61, [ESC, ESC, ESC, ""], Some("D")),
    (0x60, [ESC, ESC, ESC, ""], Some("B")),
    (0x6A, [ESC, ESC, ESC, ""], Some("C")),
];

/// The Spanish terminal's character generator keeps brackets, caret and hash
/// away from their cp037 positions.
static ES_CONVERSIONS: &[(u8, u8)] = &[(b'[', 0x4A), (b']', 0x5A), (b'^', 0x95), (b'#', 0xBC)];

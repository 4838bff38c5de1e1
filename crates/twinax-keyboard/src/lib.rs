//! Keyboard handling for the 5250 twinax converter
//!
//! 5250 keyboards report raw scancodes, not characters. Each session owns a
//! [`Decoder`] that tracks modifier latches and turns scancodes into the
//! byte sequences a VT52 application expects on its input stream.

pub mod dictionary;

pub use dictionary::{Dictionary, KeySlot, ModifierKeys};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum KeyboardError {
    #[error("unknown scancode dictionary {0:?}")]
    UnknownDictionary(String),
}

/// Result of feeding one scancode to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutput {
    /// Decoded bytes bound for the session's PTY.
    Bytes(Vec<u8>),

    /// Caps lock toggled; the station engine updates the indicator light.
    CapsLock(bool),

    /// The ALT+s chord, which toggles the keyboard clicker.
    ClickerToggle,
}

/// Per-session keyboard state machine.
#[derive(Debug, Clone)]
pub struct Decoder {
    dict: Dictionary,
    shift: bool,
    ctrl: bool,
    alt: bool,
    caps: bool,
    shift_one_shot: bool,
    ctrl_one_shot: bool,
    alt_one_shot: bool,
}

impl Decoder {
    pub fn new(dict: Dictionary) -> Self {
        Self {
            dict,
            shift: false,
            ctrl: false,
            alt: false,
            caps: false,
            shift_one_shot: false,
            ctrl_one_shot: false,
            alt_one_shot: false,
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Drop all latches, as happens on station reattach.
    pub fn reset(&mut self) {
        let dict = self.dict.clone();
        *self = Self::new(dict);
    }

    pub fn modifiers_clear(&self) -> bool {
        !(self.shift || self.ctrl || self.alt)
    }

    /// Feed one raw scancode; returns whatever the key resolves to.
    pub fn decode(&mut self, scancode: u8) -> Option<KeyOutput> {
        let m = *self.dict.modifiers();

        if m.shift_press.contains(&scancode) {
            Self::press(&mut self.shift, &mut self.shift_one_shot, m.shift_release);
            return None;
        }
        if m.shift_release.contains(&scancode) {
            self.shift = false;
            return None;
        }
        if m.ctrl_press.contains(&scancode) {
            Self::press(&mut self.ctrl, &mut self.ctrl_one_shot, m.ctrl_release);
            return None;
        }
        if m.ctrl_release.contains(&scancode) {
            self.ctrl = false;
            return None;
        }
        if m.alt_press.contains(&scancode) {
            Self::press(&mut self.alt, &mut self.alt_one_shot, m.alt_release);
            return None;
        }
        if m.alt_release.contains(&scancode) {
            self.alt = false;
            return None;
        }
        if m.caps_lock.contains(&scancode) {
            self.caps = !self.caps;
            return Some(KeyOutput::CapsLock(self.caps));
        }

        let Some(slot) = self.dict.slot(scancode).copied() else {
            debug!(target: "scancode", scancode, "unknown scancode");
            return None;
        };

        if self.alt && !self.ctrl && slot.base == "s" {
            self.clear_one_shots();
            return Some(KeyOutput::ClickerToggle);
        }

        let emission = if self.ctrl && !slot.controlled.is_empty() {
            slot.controlled
        } else if self.alt && !slot.alted.is_empty() {
            slot.alted
        } else if self.shifted_for(&slot) {
            slot.shifted
        } else {
            slot.base
        };
        self.clear_one_shots();

        if emission.is_empty() {
            return None;
        }

        let mut bytes = emission.as_bytes().to_vec();
        if emission.starts_with('\x1b') {
            if let Some(tail) = slot.escape_tail {
                bytes.extend_from_slice(tail.as_bytes());
            }
        }
        Some(KeyOutput::Bytes(bytes))
    }

    /// Caps lock negates shift for letter keys only; elsewhere shift stands
    /// alone.
    fn shifted_for(&self, slot: &KeySlot) -> bool {
        let mut chars = slot.base.chars();
        let letter = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
        if letter {
            self.shift != self.caps
        } else {
            self.shift
        }
    }

    fn press(latch: &mut bool, one_shot: &mut bool, release_set: &[u8]) {
        if release_set.is_empty() {
            // no break code: a second press toggles the latch back off
            if *latch {
                *latch = false;
                *one_shot = false;
            } else {
                *latch = true;
                *one_shot = true;
            }
        } else {
            *latch = true;
        }
    }

    fn clear_one_shots(&mut self) {
        if self.shift_one_shot {
            self.shift = false;
            self.shift_one_shot = false;
        }
        if self.ctrl_one_shot {
            self.ctrl = false;
            self.ctrl_one_shot = false;
        }
        if self.alt_one_shot {
            self.alt = false;
            self.alt_one_shot = false;
        }
    }
}

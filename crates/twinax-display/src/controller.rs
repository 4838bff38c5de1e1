//! The per-session display controller
//!
//! Feeds child-application output through the VT52 parser into the screen
//! and accumulates the side effects the station engine drains on its next
//! turn: identify replies for the input stream, bell pulses, cursor
//! visibility, and the status row.

use crate::parser::{Vt52Event, Vt52Parser};
use crate::screen::{Screen, COLS};
use twinax_charmap::CharMap;

/// Indicator bits reported by the terminal, rendered on the status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Indicators {
    pub input_inhibited: bool,
    pub system_available: bool,
    pub message_waiting: bool,
}

/// Screen, parser and translation for one attached session.
#[derive(Debug)]
pub struct DisplayController {
    screen: Screen,
    parser: Vt52Parser,
    map: CharMap,
    replies: Vec<u8>,
    bell_pending: bool,
    cursor_visible: Option<bool>,
    indicators: Indicators,
    status_dirty: bool,
}

impl DisplayController {
    pub fn new(map: CharMap) -> Self {
        Self {
            screen: Screen::new(),
            parser: Vt52Parser::new(),
            map,
            replies: Vec::new(),
            bell_pending: false,
            cursor_visible: None,
            indicators: Indicators::default(),
            status_dirty: false,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    pub fn charmap(&self) -> &CharMap {
        &self.map
    }

    /// Interpret a chunk of child output.
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            match self.parser.advance(&mut self.screen, &self.map, byte) {
                Some(Vt52Event::Identify) => self.replies.extend_from_slice(b"\x1b/K"),
                Some(Vt52Event::Bell) => self.bell_pending = true,
                Some(Vt52Event::CursorVisible(v)) => self.cursor_visible = Some(v),
                None => {}
            }
        }
    }

    /// Bytes the terminal "typed" in response to sequences (`ESC Z`),
    /// bound for the child's input stream.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    /// True once per pending bell.
    pub fn take_bell(&mut self) -> bool {
        std::mem::replace(&mut self.bell_pending, false)
    }

    /// Pending cursor-visibility change, if any.
    pub fn take_cursor_visibility(&mut self) -> Option<bool> {
        self.cursor_visible.take()
    }

    /// Update the indicator flags; the status row re-renders only on change.
    pub fn set_indicators(&mut self, indicators: Indicators) {
        if self.indicators != indicators {
            self.indicators = indicators;
            self.status_dirty = true;
        }
    }

    pub fn indicators(&self) -> Indicators {
        self.indicators
    }

    /// The freshly formatted status row as EBCDIC bytes, when it changed.
    /// VT52 output never touches this row.
    pub fn take_status_row(&mut self) -> Option<Vec<u8>> {
        if !self.status_dirty {
            return None;
        }
        self.status_dirty = false;

        let mut ascii = [b' '; COLS as usize];
        let mut col = 0;
        let mut put = |text: &str, col: &mut usize| {
            ascii[*col..*col + text.len()].copy_from_slice(text.as_bytes());
            *col += text.len() + 2;
        };
        if self.indicators.system_available {
            put("SA", &mut col);
        }
        if self.indicators.input_inhibited {
            put("II", &mut col);
        }
        if self.indicators.message_waiting {
            put("MW", &mut col);
        }

        Some(ascii.iter().map(|&a| self.map.encode_or_space(a)).collect())
    }
}

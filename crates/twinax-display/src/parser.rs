//! VT52 escape-sequence parser
//!
//! A pure transition function over (state, byte): each byte either updates
//! the screen or advances the small parse state. Printable bytes are
//! translated to EBCDIC on their way into the cells, so the screen always
//! holds what the terminal will show.

use crate::screen::Screen;
use tracing::debug;
use twinax_charmap::CharMap;

/// Side effects a sequence produces beyond the screen mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vt52Event {
    /// `ESC Z` identify request; the reply `ESC / K` goes to the child's
    /// input stream.
    Identify,

    /// BEL; pulses the keyboard clicker when enabled.
    Bell,

    /// `ESC e` / `ESC f` cursor visibility, carried to the terminal in its
    /// status byte.
    CursorVisible(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    Escape,
    /// `ESC Y`, waiting for the row byte.
    CursorRow,
    /// `ESC Y <row>`, waiting for the column byte.
    CursorCol(u8),
    /// Inside an ANSI control sequence we tolerate but mostly ignore.
    Csi,
}

/// The per-session VT52 interpreter.
#[derive(Debug, Default)]
pub struct Vt52Parser {
    state: State,
    csi: Vec<u8>,
    alternate_keypad: bool,
    wrap: bool,
}

impl Vt52Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alternate_keypad(&self) -> bool {
        self.alternate_keypad
    }

    pub fn wrap(&self) -> bool {
        self.wrap
    }

    /// Consume one byte from the child application.
    pub fn advance(&mut self, screen: &mut Screen, map: &CharMap, byte: u8) -> Option<Vt52Event> {
        match self.state {
            State::Ground => self.ground(screen, map, byte),
            State::Escape => self.escape(screen, byte),
            State::CursorRow => {
                self.state = State::CursorCol(byte);
                None
            }
            State::CursorCol(row) => {
                self.state = State::Ground;
                let row = row.saturating_sub(0x20);
                let col = byte.saturating_sub(0x20);
                screen.set_cursor(row as u16, col as u16);
                None
            }
            State::Csi => self.csi(screen, byte),
        }
    }

    fn ground(&mut self, screen: &mut Screen, map: &CharMap, byte: u8) -> Option<Vt52Event> {
        match byte {
            0x1B => {
                self.state = State::Escape;
                None
            }
            0x07 => Some(Vt52Event::Bell),
            0x08 => {
                screen.cursor_left();
                None
            }
            0x09 => {
                screen.tab();
                None
            }
            0x0A | 0x0B => {
                screen.line_feed();
                None
            }
            0x0C => {
                screen.clear();
                None
            }
            0x0D => {
                screen.carriage_return();
                None
            }
            0x00..=0x1F => None,
            _ => {
                screen.put(map.encode_or_space(byte));
                None
            }
        }
    }

    fn escape(&mut self, screen: &mut Screen, byte: u8) -> Option<Vt52Event> {
        self.state = State::Ground;
        match byte {
            b'A' => screen.cursor_up(),
            b'B' => screen.cursor_down(),
            b'C' => screen.cursor_right(),
            b'D' => screen.cursor_left(),
            b'H' => screen.cursor_home(),
            b'I' => screen.reverse_line_feed(),
            b'J' => screen.erase_to_end_of_screen(),
            b'K' => screen.erase_to_end_of_line(),
            b'E' => screen.clear(),
            b'Y' => self.state = State::CursorRow,
            b'Z' => return Some(Vt52Event::Identify),
            b'=' => self.alternate_keypad = true,
            b'>' => self.alternate_keypad = false,
            b'p' => {
                let mut attr = screen.attr();
                attr.reverse = true;
                screen.set_attr(attr);
            }
            b'q' => {
                let mut attr = screen.attr();
                attr.reverse = false;
                screen.set_attr(attr);
            }
            b'L' => screen.insert_line(),
            b'M' => screen.delete_line(),
            b'l' => screen.erase_line(),
            b'o' => screen.erase_to_start_of_line(),
            b'd' => screen.erase_to_start_of_screen(),
            b'j' => screen.save_cursor(),
            b'k' => screen.restore_cursor(),
            b'e' => return Some(Vt52Event::CursorVisible(true)),
            b'f' => return Some(Vt52Event::CursorVisible(false)),
            b'w' => self.wrap = false,
            b'v' => self.wrap = true,
            // colour selection on a monochrome tube
            b'b' | b'c' => {}
            b'[' => {
                self.csi.clear();
                self.state = State::Csi;
            }
            other => debug!(target: "display", code = other, "unknown escape sequence"),
        }
        None
    }

    /// Programs that ignore `TERM` still emit ANSI; accept the common
    /// clear-screen and swallow the rest.
    fn csi(&mut self, screen: &mut Screen, byte: u8) -> Option<Vt52Event> {
        if (0x40..=0x7E).contains(&byte) {
            self.state = State::Ground;
            if byte == b'J' && self.csi == b"2" {
                screen.clear();
            } else {
                debug!(
                    target: "display",
                    sequence = %String::from_utf8_lossy(&self.csi),
                    final_byte = %(byte as char),
                    "ignored ANSI sequence"
                );
            }
        } else if self.csi.len() >= 32 {
            // runaway parameter string; give up on the sequence
            self.state = State::Ground;
            self.csi.clear();
        } else {
            self.csi.push(byte);
        }
        None
    }
}

//! One attached terminal session
//!
//! Owns the display controller, keyboard decoder and the login child for a
//! station, and moves data between them and the station's protocol engine.

use crate::config::{Config, StationConfig};
use crate::ConverterError;
use std::io;
use std::process::Command;
use tracing::debug;
use twinax_charmap::{CharMap, Codepage};
use twinax_display::{DisplayController, DirtySpan, Indicators};
use twinax_keyboard::{Decoder, Dictionary, KeyOutput};
use twinax_pty::{Pty, PtyChild};
use twinax_station::{EngineEvent, ScreenWrite, StationEngine};

/// Bytes read from the child per scheduler pass, keeping one chatty
/// session from starving the others.
const READ_BUDGET: usize = 128;

/// A PTY-backed shell wired to one twinax station.
pub struct Session {
    address: u8,
    display: DisplayController,
    decoder: Decoder,
    child: PtyChild,
    /// Decoded keystrokes and terminal replies awaiting the child.
    outbound: Vec<u8>,
    last_cursor: (u16, u16),
    eof: bool,
}

impl Session {
    /// Allocate the PTY and start the login process for a station.
    pub fn spawn(station: &StationConfig, config: &Config) -> Result<Self, ConverterError> {
        let dictionary =
            Dictionary::by_name(&station.dictionary).map_err(crate::ConfigError::from)?;
        let codepage = Codepage::by_name(&station.codepage).map_err(crate::ConfigError::from)?;
        let map = CharMap::new(codepage).with_overrides(dictionary.custom_conversions());

        let pty = Pty::open()?;
        let mut command = Command::new(&config.shell);
        command.env("TERM", &config.term_name).env("TWINAXTERM", "y");
        if let Some(dir) = &config.terminfo_dir {
            command.env("TERMINFO", dir);
        }
        let child = pty.spawn(command)?;
        debug!(
            target: "session",
            station = station.address,
            pid = child.pid().as_raw(),
            "login process started"
        );

        Ok(Self {
            address: station.address,
            display: DisplayController::new(map),
            decoder: Decoder::new(dictionary),
            child,
            outbound: Vec::new(),
            last_cursor: (0, 0),
            eof: false,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn display(&self) -> &DisplayController {
        &self.display
    }

    /// React to one engine event. `SessionUp`/`Offline` are lifecycle and
    /// belong to the scheduler, not here.
    pub fn handle_engine_event(&mut self, event: &EngineEvent, engine: &mut StationEngine) {
        match event {
            EngineEvent::Scancode(scancode) => match self.decoder.decode(*scancode) {
                Some(KeyOutput::Bytes(bytes)) => self.outbound.extend_from_slice(&bytes),
                Some(KeyOutput::CapsLock(on)) => engine.set_caps_indicator(on),
                Some(KeyOutput::ClickerToggle) => engine.set_clicker(!engine.clicker_enabled()),
                None => {}
            },
            EngineEvent::Status {
                busy,
                exception,
                outstanding,
            } => self.display.set_indicators(Indicators {
                input_inhibited: *busy || *exception != 0,
                system_available: true,
                message_waiting: *outstanding,
            }),
            EngineEvent::SessionUp | EngineEvent::Offline(_) => {}
        }
    }

    /// Read a bounded amount of child output into the display model.
    /// Returns `false` once the child has closed its side.
    pub fn pump_child_output(&mut self) -> bool {
        if self.eof {
            return false;
        }
        let mut buf = [0u8; READ_BUDGET];
        match self.child.read(&mut buf) {
            Ok(0) => {
                self.eof = true;
                false
            }
            Ok(n) => {
                self.display.feed(&buf[..n]);
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) if e.raw_os_error() == Some(libc::EIO) => {
                // master reads report EIO once the child is gone
                self.eof = true;
                false
            }
            Err(e) => {
                debug!(target: "session", station = self.address, "pty read failed: {e}");
                self.eof = true;
                false
            }
        }
    }

    /// Push pending keyboard bytes into the child. An `EPIPE`/`EIO` failure
    /// means the session is dead.
    pub fn flush_child_input(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.child.write(&self.outbound) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Drain display-side products into the engine's command queues.
    pub fn sync_display(&mut self, engine: &mut StationEngine) {
        let replies = self.display.take_replies();
        if !replies.is_empty() {
            self.outbound.extend_from_slice(&replies);
        }
        if self.display.take_bell() {
            engine.ring_bell();
        }
        if let Some(visible) = self.display.take_cursor_visibility() {
            engine.set_cursor_visible(visible);
        }

        let cursor = self.display.screen().cursor();
        if self.display.screen().has_dirty() {
            let spans = self.display.screen_mut().take_dirty();
            let writes: Vec<ScreenWrite> = spans
                .iter()
                .map(|span: &DirtySpan| ScreenWrite {
                    row: span.row,
                    col: span.first,
                    data: self.display.screen().span_bytes(span),
                })
                .collect();
            engine.queue_screen_write(&writes, cursor);
            self.last_cursor = cursor;
        } else if cursor != self.last_cursor {
            engine.queue_cursor_move(cursor.0, cursor.1);
            self.last_cursor = cursor;
        }

        if let Some(row) = self.display.take_status_row() {
            engine.queue_status_row(&row, cursor);
        }
    }

    /// Reap the child if it already exited.
    pub fn child_exited(&mut self) -> bool {
        if self.eof {
            return true;
        }
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Tear the session apart, handing the child back for the
    /// hangup-then-kill grace dance.
    pub fn into_child(self) -> PtyChild {
        self.child
    }
}

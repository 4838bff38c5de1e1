//! Inbound serial record decoding
//!
//! The firmware writes newline-terminated records: either encoded frame
//! pairs, a `[DEBUG]`-prefixed diagnostic line, or the literal `[EOTX]`
//! marker that closes out a host-originated burst.

use crate::WireError;
use bytes::BytesMut;
use std::collections::VecDeque;

const DEBUG_PREFIX: &[u8] = b"[DEBUG]";
const EOTX_MARKER: &[u8] = b"[EOTX]";

/// One decoded inbound event, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A received frame, still as its raw serial pair.
    Word { b1: u8, b2: u8 },

    /// The firmware finished transmitting our last burst on the twinax line.
    EndOfTransmission,

    /// A `[DEBUG]` diagnostic line from the firmware.
    Debug(String),
}

/// Push-style decoder for the inbound serial stream.
///
/// Feed raw bytes with [`LineDecoder::extend`], then drain typed events with
/// [`LineDecoder::next_event`]. Partial records are held until their
/// terminating newline arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
    ready: VecDeque<WireEvent>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the serial link.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decode the next event, if a complete record is available.
    ///
    /// Returns `Ok(None)` when more data is needed. A record that is neither
    /// a marker line nor a whole number of byte pairs is consumed and
    /// reported as [`WireError::MalformedFrame`].
    pub fn next_event(&mut self) -> Result<Option<WireEvent>, WireError> {
        loop {
            if let Some(ev) = self.ready.pop_front() {
                return Ok(Some(ev));
            }

            let Some(nl) = self.buf.iter().position(|&b| b == b'\n') else {
                return Ok(None);
            };
            let mut line = self.buf.split_to(nl + 1);
            line.truncate(nl);
            // serial monitors insert CR before the terminator
            while line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                continue;
            }
            if line.starts_with(DEBUG_PREFIX) {
                return Ok(Some(WireEvent::Debug(
                    String::from_utf8_lossy(&line).into_owned(),
                )));
            }
            if line.as_ref() == EOTX_MARKER {
                return Ok(Some(WireEvent::EndOfTransmission));
            }
            if line.len() % 2 != 0 {
                return Err(WireError::MalformedFrame(line.len()));
            }

            for pair in line.chunks_exact(2) {
                self.ready.push_back(WireEvent::Word {
                    b1: pair[0],
                    b2: pair[1],
                });
            }
        }
    }

    /// Bytes buffered but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

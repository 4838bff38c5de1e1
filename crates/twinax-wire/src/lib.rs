//! Wire layer for the 5250 twinax converter
//!
//! The microcontroller transports one 16-bit twinax frame per two printable
//! serial bytes, newline-terminated. This crate owns both directions of that
//! encoding plus the 5250 command vocabulary and the field extraction for
//! terminal responses.

pub mod codec;
pub mod frame;

pub use codec::{LineDecoder, WireEvent};
pub use frame::{
    cmd, decode_word, encode_command, encode_poll, encode_word, even_parity, inbound_word,
    pair_parity, scancode_from_pair, StatusWord, LAST_FRAME_ADDRESS,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("malformed frame: {0}-byte record is not a whole number of word pairs")]
    MalformedFrame(usize),

    #[error("station address {0} out of range (0..=6)")]
    BadStation(u8),
}

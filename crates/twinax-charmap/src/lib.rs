//! EBCDIC/ASCII translation for the 5250 twinax converter
//!
//! A codepage is a pair of 256-slot tables, immutable after construction.
//! Sessions wrap one in a [`CharMap`] that consults a per-session override
//! list first; keyboard dictionaries use the overrides to pin characters the
//! terminal's character generator places at nonstandard EBCDIC codes.

mod tables;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CharmapError {
    #[error("unknown EBCDIC codepage {0:?}")]
    UnknownCodepage(String),
}

/// EBCDIC space, the fill character for anything ASCII can't express.
pub const EBCDIC_SPACE: u8 = 0x40;

/// A single EBCDIC codepage with both translation directions.
#[derive(Debug, Clone)]
pub struct Codepage {
    name: &'static str,
    ascii_to_ebcdic: [Option<u8>; 256],
    ebcdic_to_ascii: [Option<u8>; 256],
}

impl Codepage {
    /// The converter default, EBCDIC codepage 037 (US/Canada).
    pub fn cp037() -> Self {
        Self::from_pairs("cp037", tables::CP037)
    }

    /// EBCDIC codepage 500 (international), selectable per session.
    pub fn cp500() -> Self {
        Self::from_pairs("cp500", tables::CP500)
    }

    /// Look a codepage up by its configuration name.
    pub fn by_name(name: &str) -> Result<Self, CharmapError> {
        match name {
            "cp037" => Ok(Self::cp037()),
            "cp500" => Ok(Self::cp500()),
            other => Err(CharmapError::UnknownCodepage(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn from_pairs(name: &'static str, pairs: &[(u8, u8)]) -> Self {
        let mut a2e = [None; 256];
        let mut e2a = [None; 256];
        for &(ascii, ebcdic) in pairs {
            a2e[ascii as usize] = Some(ebcdic);
            e2a[ebcdic as usize] = Some(ascii);
        }
        Self {
            name,
            ascii_to_ebcdic: a2e,
            ebcdic_to_ascii: e2a,
        }
    }
}

/// A session's view of its codepage: the shared tables plus the dictionary's
/// custom character conversions, which win on the ASCII→EBCDIC path.
#[derive(Debug, Clone)]
pub struct CharMap {
    codepage: Codepage,
    overrides: Vec<(u8, u8)>,
}

impl CharMap {
    pub fn new(codepage: Codepage) -> Self {
        Self {
            codepage,
            overrides: Vec::new(),
        }
    }

    /// Install the per-session override list (ASCII byte → EBCDIC byte).
    pub fn with_overrides(mut self, overrides: &[(u8, u8)]) -> Self {
        self.overrides = overrides.to_vec();
        self
    }

    pub fn codepage_name(&self) -> &'static str {
        self.codepage.name
    }

    /// Translate an ASCII byte for the display, overrides first.
    pub fn ascii_to_ebcdic(&self, ascii: u8) -> Option<u8> {
        if let Some(&(_, e)) = self.overrides.iter().find(|&&(a, _)| a == ascii) {
            return Some(e);
        }
        self.codepage.ascii_to_ebcdic[ascii as usize]
    }

    /// Translate an inbound EBCDIC byte to ASCII.
    pub fn ebcdic_to_ascii(&self, ebcdic: u8) -> Option<u8> {
        self.codepage.ebcdic_to_ascii[ebcdic as usize]
    }

    /// Translating variant that substitutes EBCDIC space for anything
    /// unmapped, keeping the display in sync.
    pub fn encode_or_space(&self, ascii: u8) -> u8 {
        self.ascii_to_ebcdic(ascii).unwrap_or(EBCDIC_SPACE)
    }

    /// Translating variant that renders unmapped EBCDIC as `'?'`.
    pub fn decode_or_question(&self, ebcdic: u8) -> u8 {
        self.ebcdic_to_ascii(ebcdic).unwrap_or(b'?')
    }
}

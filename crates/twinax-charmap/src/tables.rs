//! Codepage data, as (ASCII, EBCDIC) pairs.
//!
//! Only the ASCII-expressible subset of each codepage is carried; EBCDIC
//! codes with no ASCII counterpart are deliberately absent and surface as
//! unmapped. Control codes follow the EBCDIC control assignments shared by
//! every single-byte codepage.

/// EBCDIC codepage 037 (US/Canada).
pub static CP037: &[(u8, u8)] = &[
    // controls
    (0x00, 0x00),
    (0x07, 0x2F), // BEL
    (0x08, 0x16), // BS
    (0x09, 0x05), // HT
    (0x0A, 0x25), // LF
    (0x0B, 0x0B),
    (0x0C, 0x0C),
    (0x0D, 0x0D),
    (0x1B, 0x27), // ESC
    (0x7F, 0x07), // DEL
    // punctuation and digits
    (b' ', 0x40),
    (b'!', 0x5A),
    (b'"', 0x7F),
    (b'#', 0x7B),
    (b'$', 0x5B),
    (b'%', 0x6C),
    (b'&', 0x50),
    (b'\'', 0x7D),
    (b'(', 0x4D),
    (b')', 0x5D),
    (b'*', 0x5C),
    (b'+', 0x4E),
    (b',', 0x6B),
    (b'-', 0x60),
    (b'.', 0x4B),
    (b'/', 0x61),
    (b'0', 0xF0),
    (b'1', 0xF1),
    (b'2', 0xF2),
    (b'3', 0xF3),
    (b'4', 0xF4),
    (b'5', 0xF5),
    (b'6', 0xF6),
    (b'7', 0xF7),
    (b'8', 0xF8),
    (b'9', 0xF9),
    (b':', 0x7A),
    (b';', 0x5E),
    (b'<', 0x4C),
    (b'=', 0x7E),
    (b'>', 0x6E),
    (b'?', 0x6F),
    (b'@', 0x7C),
    // uppercase
    (b'A', 0xC1),
    (b'B', 0xC2),
    (b'C', 0xC3),
    (b'D', 0xC4),
    (b'E', 0xC5),
    (b'F', 0xC6),
    (b'G', 0xC7),
    (b'H', 0xC8),
    (b'I', 0xC9),
    (b'J', 0xD1),
    (b'K', 0xD2),
    (b'L', 0xD3),
    (b'M', 0xD4),
    (b'N', 0xD5),
    (b'O', 0xD6),
    (b'P', 0xD7),
    (b'Q', 0xD8),
    (b'R', 0xD9),
    (b'S', 0xE2),
    (b'T', 0xE3),
    (b'U', 0xE4),
    (b'V', 0xE5),
    (b'W', 0xE6),
    (b'X', 0xE7),
    (b'Y', 0xE8),
    (b'Z', 0xE9),
    (b'[', 0xBA),
    (b'\\', 0xE0),
    (b']', 0xBB),
    (b'^', 0xB0),
    (b'_', 0x6D),
    (b'`', 0x79),
    // lowercase
    (b'a', 0x81),
    (b'b', 0x82),
    (b'c', 0x83),
    (b'd', 0x84),
    (b'e', 0x85),
    (b'f', 0x86),
    (b'g', 0x87),
    (b'h', 0x88),
    (b'i', 0x89),
    (b'j', 0x91),
    (b'k', 0x92),
    (b'l', 0x93),
    (b'm', 0x94),
    (b'n', 0x95),
    (b'o', 0x96),
    (b'p', 0x97),
    (b'q', 0x98),
    (b'r', 0x99),
    (b's', 0xA2),
    (b't', 0xA3),
    (b'u', 0xA4),
    (b'v', 0xA5),
    (b'w', 0xA6),
    (b'x', 0xA7),
    (b'y', 0xA8),
    (b'z', 0xA9),
    (b'{', 0xC0),
    (b'|', 0x4F),
    (b'}', 0xD0),
    (b'~', 0xA1),
];

/// EBCDIC codepage 500 (international). Identical to 037 except for the
/// bracket/bar/caret/bang assignments.
pub static CP500: &[(u8, u8)] = &[
    // controls
    (0x00, 0x00),
    (0x07, 0x2F),
    (0x08, 0x16),
    (0x09, 0x05),
    (0x0A, 0x25),
    (0x0B, 0x0B),
    (0x0C, 0x0C),
    (0x0D, 0x0D),
    (0x1B, 0x27),
    (0x7F, 0x07),
    // punctuation and digits
    (b' ', 0x40),
    (b'!', 0x4F),
    (b'"', 0x7F),
    (b'#', 0x7B),
    (b'$', 0x5B),
    (b'%', 0x6C),
    (b'&', 0x50),
    (b'\'', 0x7D),
    (b'(', 0x4D),
    (b')', 0x5D),
    (b'*', 0x5C),
    (b'+', 0x4E),
    (b',', 0x6B),
    (b'-', 0x60),
    (b'.', 0x4B),
    (b'/', 0x61),
    (b'0', 0xF0),
    (b'1', 0xF1),
    (b'2', 0xF2),
    (b'3', 0xF3),
    (b'4', 0xF4),
    (b'5', 0xF5),
    (b'6', 0xF6),
    (b'7', 0xF7),
    (b'8', 0xF8),
    (b'9', 0xF9),
    (b':', 0x7A),
    (b';', 0x5E),
    (b'<', 0x4C),
    (b'=', 0x7E),
    (b'>', 0x6E),
    (b'?', 0x6F),
    (b'@', 0x7C),
    // uppercase
    (b'A', 0xC1),
    (b'B', 0xC2),
    (b'C', 0xC3),
    (b'D', 0xC4),
    (b'E', 0xC5),
    (b'F', 0xC6),
    (b'G', 0xC7),
    (b'H', 0xC8),
    (b'I', 0xC9),
    (b'J', 0xD1),
    (b'K', 0xD2),
    (b'L', 0xD3),
    (b'M', 0xD4),
    (b'N', 0xD5),
    (b'O', 0xD6),
    (b'P', 0xD7),
    (b'Q', 0xD8),
    (b'R', 0xD9),
    (b'S', 0xE2),
    (b'T', 0xE3),
    (b'U', 0xE4),
    (b'V', 0xE5),
    (b'W', 0xE6),
    (b'X', 0xE7),
    (b'Y', 0xE8),
    (b'Z', 0xE9),
    (b'[', 0x4A),
    (b'\\', 0xE0),
    (b']', 0x5A),
    (b'^', 0x5F),
    (b'_', 0x6D),
    (b'`', 0x79),
    // lowercase
    (b'a', 0x81),
    (b'b', 0x82),
    (b'c', 0x83),
    (b'd', 0x84),
    (b'e', 0x85),
    (b'f', 0x86),
    (b'g', 0x87),
    (b'h', 0x88),
    (b'i', 0x89),
    (b'j', 0x91),
    (b'k', 0x92),
    (b'l', 0x93),
    (b'm', 0x94),
    (b'n', 0x95),
    (b'o', 0x96),
    (b'p', 0x97),
    (b'q', 0x98),
    (b'r', 0x99),
    (b's', 0xA2),
    (b't', 0xA3),
    (b'u', 0xA4),
    (b'v', 0xA5),
    (b'w', 0xA6),
    (b'x', 0xA7),
    (b'y', 0xA8),
    (b'z', 0xA9),
    (b'{', 0xC0),
    (b'|', 0xBB),
    (b'}', 0xD0),
    (b'~', 0xA1),
];

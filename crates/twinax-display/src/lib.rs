//! Display model for the 5250 twinax converter
//!
//! Holds the per-session screen image the way the terminal's regen buffer
//! will hold it: 24×80 cells of EBCDIC character plus attribute, with a
//! separate status row. A small VT52 parser mutates the screen; the station
//! engine later drains the accumulated dirty extents into write bursts.

pub mod controller;
pub mod parser;
pub mod screen;

pub use controller::{DisplayController, Indicators};
pub use parser::{Vt52Event, Vt52Parser};
pub use screen::{Attr, Cell, DirtySpan, Screen, COLS, ROWS};

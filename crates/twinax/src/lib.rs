//! Host core of the IBM 5250 twinax terminal converter
//!
//! Bridges twinax terminals, reached through a microcontroller on a serial
//! link, onto PTY-backed login sessions. The scheduler multiplexes up to
//! seven stations over the one link, driving a protocol engine per station
//! and a VT52 display model per session.

pub mod config;
pub mod scheduler;
pub mod serial;
pub mod session;

pub use config::{Config, ConfigError, StationConfig};
pub use scheduler::Scheduler;
pub use serial::SerialLink;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConverterError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("serial link: {0}")]
    Serial(#[from] std::io::Error),

    #[error("pty: {0}")]
    Pty(#[from] twinax_pty::PtyError),
}

impl ConverterError {
    /// Exit-code contract: 1 configuration, 2 serial, 3 PTY allocation.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConverterError::Config(_) => 1,
            ConverterError::Serial(_) => 2,
            ConverterError::Pty(_) => 3,
        }
    }
}

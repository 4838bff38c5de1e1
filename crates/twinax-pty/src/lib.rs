//! PTY handling for the 5250 twinax converter
//!
//! Each attached terminal gets a pseudo-terminal pair; the slave side
//! becomes the controlling terminal of a login process and the master side
//! is pumped by the session scheduler.

pub mod pty;

pub use pty::{Pty, PtyChild};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("failed to allocate PTY: {0}")]
    AllocationFailed(String),

    #[error("failed to spawn login process: {0}")]
    SpawnFailed(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
}

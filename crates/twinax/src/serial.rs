//! The serial link to the converter microcontroller
//!
//! 57600 baud, 8N1, raw. The link is owned exclusively by the scheduler;
//! inbound bytes flow through the wire codec into typed events.

use nix::sys::termios::{
    cfmakeraw, cfsetspeed, tcflush, tcgetattr, tcsetattr, BaudRate, ControlFlags, FlushArg, SetArg,
};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tokio::io::unix::AsyncFd;
use tracing::debug;
use twinax_wire::{LineDecoder, WireError, WireEvent};

/// The converter's serial device, decoded side included.
pub struct SerialLink {
    inner: AsyncFd<File>,
    decoder: LineDecoder,
}

impl SerialLink {
    /// Open and configure the serial device.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)?;

        configure_raw(&file)?;
        Self::from_file(file)
    }

    /// Wrap an already-open device. Used with a PTY pair standing in for
    /// the converter, so the whole stack can run without hardware.
    pub fn from_file(file: File) -> io::Result<Self> {
        if let Err(e) = configure_raw(&file) {
            // not a tty; plain pipes still work for decoding tests
            debug!(target: "wire", "raw-mode setup skipped: {e}");
        }
        set_nonblocking(&file)?;
        Ok(Self {
            inner: AsyncFd::new(file)?,
            decoder: LineDecoder::new(),
        })
    }

    /// Wait until the device has bytes to read.
    pub async fn readable(&self) {
        if let Ok(mut guard) = self.inner.readable().await {
            guard.clear_ready();
        }
    }

    /// Pull whatever the device has buffered into the decoder.
    pub fn read_available(&mut self) -> io::Result<usize> {
        let mut total = 0;
        let mut buf = [0u8; 512];
        loop {
            let n = unsafe {
                libc::read(
                    self.inner.get_ref().as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n > 0 {
                self.decoder.extend(&buf[..n as usize]);
                total += n as usize;
            } else if n == 0 {
                return Ok(total);
            } else {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(total);
                }
                return Err(err);
            }
        }
    }

    /// Next decoded inbound event, if a complete record arrived.
    pub fn next_event(&mut self) -> Result<Option<WireEvent>, WireError> {
        self.decoder.next_event()
    }

    /// Transmit one complete record, waiting out a full kernel buffer.
    pub async fn send_record(&mut self, record: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < record.len() {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| {
                let n = unsafe {
                    libc::write(
                        inner.get_ref().as_raw_fd(),
                        record[offset..].as_ptr() as *const libc::c_void,
                        record.len() - offset,
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            }) {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

fn configure_raw(file: &File) -> io::Result<()> {
    let mut termios = tcgetattr(file).map_err(io_from_errno)?;
    cfmakeraw(&mut termios);
    termios.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
    if let Err(e) = cfsetspeed(&mut termios, BaudRate::B57600) {
        // a PTY standing in for the converter has no baud generator
        debug!(target: "wire", "cfsetspeed ignored: {e}");
    }
    tcsetattr(file, SetArg::TCSANOW, &termios).map_err(io_from_errno)?;
    tcflush(file, FlushArg::TCIFLUSH).map_err(io_from_errno)?;
    Ok(())
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn io_from_errno(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

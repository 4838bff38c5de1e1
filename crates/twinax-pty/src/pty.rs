//! Low-level PTY allocation and login-process management

use crate::PtyError;
use nix::pty::{openpty, OpenptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, setsid, ForkResult, Pid};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::Command;

/// A freshly opened pseudo-terminal pair, sized for the 5250 screen.
pub struct Pty {
    master: OwnedFd,
    slave: OwnedFd,
}

impl Pty {
    /// Allocate a PTY pair with a non-blocking master.
    pub fn open() -> Result<Self, PtyError> {
        let winsize = Winsize {
            ws_row: 24,
            ws_col: 80,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        let OpenptyResult { master, slave } = openpty(Some(&winsize), None)
            .map_err(|e| PtyError::AllocationFailed(format!("openpty failed: {e}")))?;

        set_nonblocking(master.as_raw_fd())?;

        Ok(Self { master, slave })
    }

    /// Fork the login process with the slave side as its controlling
    /// terminal on stdin/stdout/stderr, consuming the pair.
    pub fn spawn(self, mut command: Command) -> Result<PtyChild, PtyError> {
        let Pty { master, slave } = self;

        match unsafe { fork() }.map_err(|e| PtyError::SpawnFailed(format!("fork failed: {e}")))? {
            ForkResult::Parent { child } => {
                drop(slave);
                Ok(PtyChild {
                    master,
                    pid: child,
                })
            }
            ForkResult::Child => {
                drop(master);
                let slave_fd = slave.as_raw_fd();

                // new session so the slave can become the controlling tty
                setsid().expect("setsid failed");

                unsafe {
                    libc::dup2(slave_fd, 0);
                    libc::dup2(slave_fd, 1);
                    libc::dup2(slave_fd, 2);
                    if libc::ioctl(0, libc::TIOCSCTTY as libc::c_ulong, 0) < 0 {
                        eprintln!("TIOCSCTTY failed: {}", io::Error::last_os_error());
                        std::process::exit(1);
                    }
                    if slave_fd > 2 {
                        libc::close(slave_fd);
                    }
                }
                std::mem::forget(slave);

                let err = command.exec();
                eprintln!("failed to execute login process: {err}");
                std::process::exit(1);
            }
        }
    }
}

/// A login process running on the slave end of a PTY.
pub struct PtyChild {
    master: OwnedFd,
    pid: Pid,
}

impl PtyChild {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Non-blocking read from the master side. `WouldBlock` means no output
    /// is pending; `Ok(0)` means the child closed its side.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::read(
                self.master.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Non-blocking write toward the child's stdin. May write short when the
    /// kernel buffer is full.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::write(
                self.master.as_raw_fd(),
                data.as_ptr() as *const libc::c_void,
                data.len(),
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Reap the child if it has exited, without blocking.
    pub fn try_wait(&self) -> Result<Option<i32>, PtyError> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG))
            .map_err(|e| PtyError::Io(io::Error::from_raw_os_error(e as i32)))?
        {
            WaitStatus::Exited(_, code) => Ok(Some(code)),
            WaitStatus::Signaled(_, signal, _) => Ok(Some(128 + signal as i32)),
            WaitStatus::StillAlive => Ok(None),
            _ => Ok(Some(-1)),
        }
    }

    /// Block until the child exits and return its status.
    pub fn wait(&self) -> Result<i32, PtyError> {
        match waitpid(self.pid, None)
            .map_err(|e| PtyError::Io(io::Error::from_raw_os_error(e as i32)))?
        {
            WaitStatus::Exited(_, code) => Ok(code),
            WaitStatus::Signaled(_, signal, _) => Ok(128 + signal as i32),
            _ => Ok(-1),
        }
    }

    /// Ask the child to hang up, the polite half of detach.
    pub fn hangup(&self) -> Result<(), PtyError> {
        kill(self.pid, Signal::SIGHUP)
            .map_err(|e| PtyError::Io(io::Error::from_raw_os_error(e as i32)))
    }

    /// Force the child down after the detach grace period.
    pub fn kill(&self) -> Result<(), PtyError> {
        kill(self.pid, Signal::SIGKILL)
            .map_err(|e| PtyError::Io(io::Error::from_raw_os_error(e as i32)))
    }
}

impl AsRawFd for PtyChild {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

fn set_nonblocking(fd: RawFd) -> Result<(), PtyError> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(PtyError::AllocationFailed(format!(
                "failed to set non-blocking: {}",
                io::Error::last_os_error()
            )));
        }
    }
    Ok(())
}

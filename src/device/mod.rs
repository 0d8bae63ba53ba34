//! Serial device access.
//!
//! The console and the reader thread talk to the device through the
//! [`SerialLink`] trait so both loops can run against a real tty
//! ([`Device`]) or an in-process link ([`memory::MemoryLink`]).
//!
//! # Architecture
//!
//! ```text
//! Device (owns the tty fd + a wake pipe)
//!  ├── wait_readable()  poll(device, wake) with no timeout   ← reader thread
//!  ├── read_chunk()     one read(2)                          ← reader thread
//!  ├── write_bytes()    keystrokes, interrupt byte           ← console thread
//!  ├── write_paced()    trigger responses, one byte at a time ← reader thread
//!  └── wake()           unblocks wait_readable on shutdown   ← console thread
//! ```
//!
//! Writes from both threads go through one mutex, so a keystroke can never
//! land in the middle of a trigger response.

// Rust guideline compliant 2026-02

pub mod line_mode;
pub mod memory;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;

pub use line_mode::{LineControl, LineModeController, LineModeError};

/// Result of waiting for the device to become readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Data can be read without blocking.
    Data,
    /// The wait was interrupted by [`SerialLink::wake`] or returned spuriously.
    Wake,
    /// The descriptor reported an error or hangup condition.
    Fault {
        /// Raw `revents` bits reported by `poll(2)`.
        revents: i16,
    },
}

/// Byte-level access to a serial endpoint shared by both session threads.
pub trait SerialLink: Send + Sync {
    /// Block until the device is readable, faulted, or woken.
    fn wait_readable(&self) -> io::Result<Readiness>;

    /// Perform a single read into `buf`.
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `bytes` to the device in one locked burst.
    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()>;

    /// Write `bytes` one at a time, sleeping `pacing` after each byte.
    ///
    /// The write lock is held for the whole sequence.
    fn write_paced(&self, bytes: &[u8], pacing: Duration) -> io::Result<()>;

    /// Wait until everything written has been handed to the hardware.
    fn flush_output(&self) -> io::Result<()>;

    /// Unblock a thread sitting in [`wait_readable`](Self::wait_readable).
    fn wake(&self);
}

/// Errors raised while opening and locking the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// `open(2)` failed.
    #[error("Serial port open {}: {source}", path.display())]
    Open {
        /// Device path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Switching the descriptor back to blocking mode failed.
    #[error("Serial port fcntl: {0}")]
    Mode(io::Error),
    /// Another process holds the lock.
    #[error("Serial port {} locked in use by other program", path.display())]
    Locked {
        /// Device path.
        path: PathBuf,
    },
    /// Taking the lock failed for another reason.
    #[error("Serial port lockf: {0}")]
    Lock(io::Error),
    /// Discarding pending I/O failed.
    #[error("Serial port tcflush: {0}")]
    Flush(io::Error),
    /// Reading or setting the modem control lines failed.
    #[error("Serial port handshake {step}: {source}")]
    Handshake {
        /// `TIOCMGET` or `TIOCMSET`.
        step: &'static str,
        /// Underlying error.
        source: io::Error,
    },
    /// Creating the wake pipe failed.
    #[error("Wake pipe: {0}")]
    WakePipe(io::Error),
}

impl DeviceError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Locked { .. } => 2,
            _ => 1,
        }
    }
}

/// An open, exclusively locked serial device.
pub struct Device {
    path: PathBuf,
    file: File,
    wake_rx: OwnedFd,
    wake_tx: OwnedFd,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Open `path` read/write without making it the controlling tty,
    /// take an exclusive `lockf` lock and discard pending I/O.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let fd = file.as_raw_fd();

        // The non-blocking open only keeps us from hanging on carrier detect.
        set_nonblocking(fd, false).map_err(DeviceError::Mode)?;

        // SAFETY: fd is a valid open descriptor owned by `file`.
        if unsafe { libc::lockf(fd, libc::F_TEST, 1) } < 0 {
            return Err(DeviceError::Locked {
                path: path.to_path_buf(),
            });
        }
        // SAFETY: as above.
        if unsafe { libc::lockf(fd, libc::F_TLOCK, 1) } < 0 {
            return Err(DeviceError::Lock(io::Error::last_os_error()));
        }
        // SAFETY: as above.
        if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
            return Err(DeviceError::Flush(io::Error::last_os_error()));
        }

        let (wake_rx, wake_tx) = wake_pipe().map_err(DeviceError::WakePipe)?;
        log::info!("Opened serial device {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            wake_rx,
            wake_tx,
            write_lock: Mutex::new(()),
        })
    }

    /// Device path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and discard whatever the device has buffered.
    ///
    /// Polls with a short timeout and stops at the first quiet interval.
    /// Returns the number of bytes dropped.
    pub fn drain_input(&self) -> usize {
        let mut buf = [0u8; crate::constants::DEVICE_READ_BUFFER];
        let timeout = crate::constants::DEVICE_DRAIN_INTERVAL.as_millis() as libc::c_int;
        let mut dropped = 0;

        loop {
            let mut pollfd = libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            // SAFETY: pollfd points to one initialized pollfd struct.
            let ready = unsafe { libc::poll(&mut pollfd, 1, timeout) };
            if ready != 1 || pollfd.revents & libc::POLLIN == 0 {
                break;
            }
            match (&self.file).read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => dropped += n,
            }
        }

        if dropped > 0 {
            log::debug!("Drained {dropped} stale bytes from {}", self.path.display());
        }
        dropped
    }

    /// Assert or deassert DTR, leaving the other modem lines alone.
    ///
    /// Boards that wire DTR to their reset pin are held in reset while it
    /// is asserted.
    pub fn set_dtr(&self, asserted: bool) -> Result<(), DeviceError> {
        let fd = self.file.as_raw_fd();
        let mut status: libc::c_int = 0;
        // SAFETY: TIOCMGET writes one c_int through the provided pointer.
        if unsafe { libc::ioctl(fd, libc::TIOCMGET, &mut status as *mut libc::c_int) } == -1 {
            return Err(DeviceError::Handshake {
                step: "TIOCMGET",
                source: io::Error::last_os_error(),
            });
        }
        if asserted {
            status |= libc::TIOCM_DTR;
        } else {
            status &= !libc::TIOCM_DTR;
        }
        // SAFETY: TIOCMSET reads one c_int through the provided pointer.
        if unsafe { libc::ioctl(fd, libc::TIOCMSET, &status as *const libc::c_int) } == -1 {
            return Err(DeviceError::Handshake {
                step: "TIOCMSET",
                source: io::Error::last_os_error(),
            });
        }
        log::info!(
            "DTR {} on {}",
            if asserted { "asserted" } else { "deasserted" },
            self.path.display()
        );
        Ok(())
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain_wake_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            // SAFETY: buf is a valid writable buffer of buf.len() bytes and
            // wake_rx is an open non-blocking descriptor.
            let n = unsafe {
                libc::read(
                    self.wake_rx.as_raw_fd(),
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl SerialLink for Device {
    fn wait_readable(&self) -> io::Result<Readiness> {
        let mut fds = [
            libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wake_rx.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];

        // SAFETY: fds is an array of two initialized pollfd structs.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
        if ready < 0 {
            return Err(io::Error::last_os_error());
        }

        if fds[1].revents & libc::POLLIN != 0 {
            self.drain_wake_pipe();
            return Ok(Readiness::Wake);
        }

        let revents = fds[0].revents;
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Ok(Readiness::Fault { revents });
        }
        if revents & libc::POLLIN != 0 {
            return Ok(Readiness::Data);
        }
        Ok(Readiness::Wake)
    }

    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.file).read(buf)
    }

    fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock_writes();
        (&self.file).write_all(bytes)
    }

    fn write_paced(&self, bytes: &[u8], pacing: Duration) -> io::Result<()> {
        let _guard = self.lock_writes();
        for byte in bytes {
            (&self.file).write_all(std::slice::from_ref(byte))?;
            if !pacing.is_zero() {
                thread::sleep(pacing);
            }
        }
        Ok(())
    }

    fn flush_output(&self) -> io::Result<()> {
        let _guard = self.lock_writes();
        // SAFETY: fd is a valid open descriptor owned by `file`.
        if unsafe { libc::tcdrain(self.file.as_raw_fd()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn wake(&self) {
        // SAFETY: writing one byte from a valid buffer to an open descriptor.
        unsafe {
            libc::write(
                self.wake_tx.as_raw_fd(),
                [1u8].as_ptr().cast::<libc::c_void>(),
                1,
            );
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: fd is still open; the lock is released before close.
        if unsafe { libc::lockf(self.file.as_raw_fd(), libc::F_ULOCK, 1) } < 0 {
            log::warn!(
                "Failed to unlock {}: {}",
                self.path.display(),
                io::Error::last_os_error()
            );
        }
        log::info!("Closed serial device {}", self.path.display());
    }
}

/// Set or clear `O_NONBLOCK` on `fd`.
fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    // SAFETY: F_GETFL on a caller-provided open descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    // SAFETY: F_SETFL with flags derived from F_GETFL.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Create a non-blocking `pipe()` pair used to wake the reader thread.
///
/// Returns `(read_end, write_end)`.
fn wake_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `pipe` writes exactly two valid FDs into `fds` on success.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nobody else.
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    set_nonblocking(rx.as_raw_fd(), true)?;
    set_nonblocking(tx.as_raw_fd(), true)?;
    Ok((rx, tx))
}

//! Keyboard side of the console.
//!
//! The console reads keystrokes through [`KeySource`] and puts the
//! keyboard back the way it found it through [`TerminalRestore`]. The real
//! implementations work on fd 0 with `libc`; tests substitute scripted
//! ones.

// Rust guideline compliant 2026-02

pub mod guard;

use std::io;
use std::time::Duration;

pub use guard::KeyboardMode;

/// Result of one keyboard poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// This many bytes were read into the buffer.
    Bytes(usize),
    /// Nothing arrived before the timeout.
    Idle,
    /// The input is gone (EOF, hangup, or a permanent error).
    Closed,
}

/// Source of keystrokes.
pub trait KeySource {
    /// Wait up to `timeout` for input and read what is available into `buf`.
    fn read_keys(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<KeyInput>;
}

/// Restores the keyboard configuration on shutdown.
pub trait TerminalRestore {
    /// Put the saved configuration back. Repeated calls do nothing.
    fn restore(&mut self) -> io::Result<()>;
}

/// Keystrokes from stdin.
///
/// Reads fd 0 directly with `libc::poll` + `libc::read`: `std::io::stdin()`
/// keeps its own buffer, which `poll` cannot see.
#[derive(Debug, Default)]
pub struct StdinKeys;

impl StdinKeys {
    /// Reader for fd 0.
    pub fn new() -> Self {
        Self
    }
}

impl KeySource for StdinKeys {
    fn read_keys(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<KeyInput> {
        let mut pollfd = libc::pollfd {
            fd: libc::STDIN_FILENO,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

        // SAFETY: pollfd points to one initialized pollfd struct.
        let ready = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(KeyInput::Idle);
            }
            return Err(err);
        }
        if ready == 0 {
            return Ok(KeyInput::Idle);
        }
        if pollfd.revents & libc::POLLIN == 0 {
            if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                log::error!(
                    "stdin poll error (revents=0x{:x}), stdin is dead",
                    pollfd.revents
                );
                return Ok(KeyInput::Closed);
            }
            return Ok(KeyInput::Idle);
        }

        // SAFETY: buf is valid for buf.len() bytes of writes.
        let n = unsafe {
            libc::read(
                libc::STDIN_FILENO,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        match n {
            0 => Ok(KeyInput::Closed),
            n if n > 0 => Ok(KeyInput::Bytes(n.unsigned_abs())),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(KeyInput::Idle),
                    _ => Err(err),
                }
            }
        }
    }
}

//! Keyboard line discipline.
//!
//! [`KeyboardMode::enter`] turns off canonical input and echo on stdin so
//! every keystroke reaches the console as it is typed. The saved settings
//! go back exactly once, from [`restore`](TerminalRestore::restore) or
//! from `Drop` if the caller never got that far.

use std::io;
use std::os::fd::RawFd;

use super::TerminalRestore;

/// Non-canonical, no-echo keyboard with its saved configuration.
pub struct KeyboardMode {
    fd: RawFd,
    saved: Option<libc::termios>,
}

impl std::fmt::Debug for KeyboardMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyboardMode")
            .field("fd", &self.fd)
            .field("active", &self.saved.is_some())
            .finish()
    }
}

impl KeyboardMode {
    /// Switch stdin to non-canonical, no-echo input with `VMIN=0`, `VTIME=0`.
    pub fn enter() -> io::Result<Self> {
        Self::enter_fd(libc::STDIN_FILENO)
    }

    /// Same as [`enter`](Self::enter) for an arbitrary terminal descriptor.
    pub fn enter_fd(fd: RawFd) -> io::Result<Self> {
        // SAFETY: termios is plain old data; all-zero is a valid value.
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: saved is a valid out-pointer.
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;

        // SAFETY: fd is a terminal and raw is fully initialized.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }

        log::debug!("Keyboard switched to non-canonical mode");
        Ok(Self {
            fd,
            saved: Some(saved),
        })
    }

    /// A mode that changed nothing and restores nothing.
    ///
    /// Used when stdin is not a terminal.
    pub fn inactive() -> Self {
        Self {
            fd: libc::STDIN_FILENO,
            saved: None,
        }
    }

    /// Whether a configuration is waiting to be restored.
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }
}

impl TerminalRestore for KeyboardMode {
    fn restore(&mut self) -> io::Result<()> {
        let Some(saved) = self.saved.take() else {
            return Ok(());
        };
        // SAFETY: fd was a terminal when saved was captured.
        if unsafe { libc::tcsetattr(self.fd, libc::TCSANOW, &saved) } != 0 {
            return Err(io::Error::last_os_error());
        }
        log::debug!("Keyboard configuration restored");
        Ok(())
    }
}

impl Drop for KeyboardMode {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            log::warn!("Failed to restore keyboard: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_restore_is_noop() {
        let mut mode = KeyboardMode::inactive();
        assert!(!mode.is_active());
        mode.restore().unwrap();
        mode.restore().unwrap();
    }

    #[test]
    fn test_enter_on_non_terminal_fails() {
        let file = tempfile::tempfile().unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&file);
        assert!(KeyboardMode::enter_fd(fd).is_err());
    }
}

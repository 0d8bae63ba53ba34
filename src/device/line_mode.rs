//! Line speed and framing control.
//!
//! [`LineModeController`] captures the device's termios once, before the
//! first raw-mode write, and reapplies exactly that snapshot on
//! [`restore`](LineControl::restore) no matter how many speed changes
//! happened in between.

use std::io;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use thiserror::Error;

use super::Device;
use crate::speed;

/// Errors from configuring the line. Each variant names the failing step.
#[derive(Debug, Error)]
pub enum LineModeError {
    /// The platform has no baud constant for this rate.
    #[error("speed {0} bps is not supported on this platform")]
    UnsupportedRate(u32),
    /// `tcgetattr` failed.
    #[error("tcgetattr: {0}")]
    Query(io::Error),
    /// `cfsetspeed` rejected the rate.
    #[error("cfsetspeed {rate}: {source}")]
    Rate {
        /// Requested rate in bps.
        rate: u32,
        /// Underlying error.
        source: io::Error,
    },
    /// `tcsetattr` failed.
    #[error("Failed to set terminal state: {0}")]
    Commit(io::Error),
}

/// Speed changes and final restore of the device configuration.
pub trait LineControl {
    /// Configure raw 8N1 framing at the rate of speed table entry `index`.
    fn apply_speed(&mut self, index: usize) -> Result<(), LineModeError>;

    /// Reapply the configuration captured before the first change.
    fn restore(&mut self) -> Result<(), LineModeError>;
}

/// termios-backed [`LineControl`] for a [`Device`].
pub struct LineModeController {
    device: Arc<Device>,
    saved: libc::termios,
    restored: bool,
}

impl std::fmt::Debug for LineModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineModeController")
            .field("device", &self.device.path())
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

impl LineModeController {
    /// Snapshot the device's current configuration.
    ///
    /// Must run before any speed is applied: the snapshot is what
    /// [`restore`](LineControl::restore) puts back.
    pub fn capture(device: Arc<Device>) -> Result<Self, LineModeError> {
        let saved = get_attr(device.as_raw_fd())?;
        Ok(Self {
            device,
            saved,
            restored: false,
        })
    }
}

impl LineControl for LineModeController {
    fn apply_speed(&mut self, index: usize) -> Result<(), LineModeError> {
        let rate = speed::rate(index);
        let baud = baud_constant(rate).ok_or(LineModeError::UnsupportedRate(rate))?;
        let fd = self.device.as_raw_fd();

        let mut attr = get_attr(fd)?;
        // SAFETY: attr is an initialized termios struct.
        unsafe { libc::cfmakeraw(&mut attr) };
        // cfmakeraw leaves hardware flow control as it was.
        attr.c_cflag &= !libc::CRTSCTS;
        attr.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        attr.c_cflag |= libc::CLOCAL;

        // SAFETY: as above.
        if unsafe { libc::cfsetspeed(&mut attr, baud) } < 0 {
            return Err(LineModeError::Rate {
                rate,
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: fd is the device's open descriptor.
        if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } != 0 {
            log::warn!("tcflush before speed change: {}", io::Error::last_os_error());
        }

        // SAFETY: fd is open and attr is fully initialized.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &attr) } != 0 {
            return Err(LineModeError::Commit(io::Error::last_os_error()));
        }

        log::info!("{} set to {rate} bps", self.device.path().display());
        Ok(())
    }

    fn restore(&mut self) -> Result<(), LineModeError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        // SAFETY: fd is open and saved was filled by tcgetattr.
        if unsafe { libc::tcsetattr(self.device.as_raw_fd(), libc::TCSANOW, &self.saved) } != 0 {
            return Err(LineModeError::Commit(io::Error::last_os_error()));
        }
        log::info!("Restored line settings of {}", self.device.path().display());
        Ok(())
    }
}

fn get_attr(fd: libc::c_int) -> Result<libc::termios, LineModeError> {
    // SAFETY: termios is plain old data; all-zero is a valid value.
    let mut attr: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: attr is a valid out-pointer for tcgetattr.
    if unsafe { libc::tcgetattr(fd, &mut attr) } != 0 {
        return Err(LineModeError::Query(io::Error::last_os_error()));
    }
    Ok(attr)
}

/// Map a rate in bps to the platform's `Bxxx` constant.
pub fn baud_constant(rate: u32) -> Option<libc::speed_t> {
    let baud = match rate {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115_200 => libc::B115200,
        230_400 => libc::B230400,
        _ => return high_rate_constant(rate),
    };
    Some(baud)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn high_rate_constant(rate: u32) -> Option<libc::speed_t> {
    let baud = match rate {
        460_800 => libc::B460800,
        921_600 => libc::B921600,
        1_000_000 => libc::B1000000,
        1_152_000 => libc::B1152000,
        1_500_000 => libc::B1500000,
        2_000_000 => libc::B2000000,
        2_500_000 => libc::B2500000,
        3_000_000 => libc::B3000000,
        3_500_000 => libc::B3500000,
        4_000_000 => libc::B4000000,
        _ => return None,
    };
    Some(baud)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn high_rate_constant(_rate: u32) -> Option<libc::speed_t> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_standard_rate_has_a_constant() {
        for &rate in &speed::SPEEDS[..=speed::DEFAULT_SPEED_INDEX] {
            assert!(baud_constant(rate).is_some(), "no constant for {rate}");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_supports_whole_table() {
        for &rate in speed::SPEEDS {
            assert!(baud_constant(rate).is_some(), "no constant for {rate}");
        }
    }

    #[test]
    fn test_unknown_rate_has_no_constant() {
        assert!(baud_constant(12345).is_none());
    }

    #[test]
    fn test_error_messages_name_the_step() {
        let err = LineModeError::Query(io::Error::from(io::ErrorKind::Other));
        assert!(err.to_string().starts_with("tcgetattr"));
        let err = LineModeError::Rate {
            rate: 9600,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        };
        assert!(err.to_string().contains("9600"));
        assert!(LineModeError::UnsupportedRate(7)
            .to_string()
            .contains("not supported"));
    }
}

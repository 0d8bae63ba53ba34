//! Application-wide constants for ucon.
//!
//! This module centralizes the magic numbers of the console: poll
//! intervals, buffer sizes, trigger file limits, and the control bytes of
//! the command-key protocol.
//!
//! # Categories
//!
//! - **Polling**: Keyboard loop and device drain intervals
//! - **Buffers**: Read chunk sizes
//! - **Triggers**: Rule length limits and response framing
//! - **Keys**: Control bytes understood by the command interpreter
//! - **Screen**: Escape sequences and fixed text

use std::time::Duration;

// ============================================================================
// Polling
// ============================================================================

/// Keyboard poll timeout for the foreground loop.
///
/// The foreground loop polls stdin with this timeout so it can also notice
/// `exit_requested` and pending signal events between keystrokes.
pub const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll timeout used while draining stale device input after setup.
pub const DEVICE_DRAIN_INTERVAL: Duration = Duration::from_millis(1);

/// How long DTR stays asserted when resetting the target on connect.
pub const RESET_PULSE: Duration = Duration::from_millis(500);

/// Default inter-byte delay when injecting a trigger response.
///
/// Some device firmware cannot keep up with a burst at high line rates.
pub const DEFAULT_RESPONSE_PACING: Duration = Duration::from_millis(1);

// ============================================================================
// Buffers
// ============================================================================

/// Size of a single device read.
pub const DEVICE_READ_BUFFER: usize = 8192;

/// Size of a single keyboard read.
pub const KEYBOARD_READ_BUFFER: usize = 4096;

// ============================================================================
// Triggers
// ============================================================================

/// Maximum length in bytes of a trigger or a response; longer lines are truncated.
pub const MAX_RULE_LEN: usize = 1024;

/// Minimum trigger length in bytes. Shorter lines are skipped.
pub const MIN_TRIGGER_LEN: usize = 2;

/// Byte written before and after every trigger response.
pub const RESPONSE_TERMINATOR: u8 = b'\r';

// ============================================================================
// Keys
// ============================================================================

/// Ctrl-A: command key.
pub const KEY_CTRL_A: u8 = 0x01;

/// Ctrl-C: interrupt byte sent to the device on SIGINT.
pub const KEY_CTRL_C: u8 = 0x03;

/// Ctrl-D: alternate command key.
pub const KEY_CTRL_D: u8 = 0x04;

/// Ctrl-X: exit.
pub const KEY_CTRL_X: u8 = 0x18;

// ============================================================================
// Screen
// ============================================================================

/// Separator line printed around the startup banner.
pub const BANNER_RULE: &str = "-----------------------------------------------------------";

/// Help text printed by the `H` command.
pub const HELP_TEXT: &str = "Ctrl-X - exit\n\
Ctrl-A or Ctrl-D is a command key combination.\n\
Press it and next command letter:\n\
H/h - print help\n\
Q/q - exit\n\
C/c - clear screen\n\
P/p - print port speed, trigger and timestamp status\n\
T/t - enable/disable time stamp at start of each line\n\
M/m - trigger to command enable/disable\n\
U/u - increase port speed\n\
D/d - decrease port speed\n\n\
Example:\n  Ctrl-D C or Ctrl-A C - clear the screen\n";

/// Timestamp prefix format (chrono `strftime` syntax).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S | ";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keys_are_distinct() {
        let keys = [KEY_CTRL_A, KEY_CTRL_C, KEY_CTRL_D, KEY_CTRL_X];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_rule_limits_are_consistent() {
        assert!(MIN_TRIGGER_LEN >= 1);
        assert!(MIN_TRIGGER_LEN < MAX_RULE_LEN);
    }

    #[test]
    fn test_help_mentions_every_command() {
        for letter in ["H/h", "Q/q", "C/c", "P/p", "T/t", "M/m", "U/u", "D/d"] {
            assert!(HELP_TEXT.contains(letter), "help is missing {letter}");
        }
    }
}

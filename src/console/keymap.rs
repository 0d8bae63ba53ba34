//! Command-key protocol.
//!
//! Ctrl-A or Ctrl-D arms the interpreter; the next byte picks a command.
//! Ctrl-X exits immediately. Anything else passes through to the device.
//!
//! | State           | Byte             | Action            | Next            |
//! |-----------------|------------------|-------------------|-----------------|
//! | Idle            | Ctrl-A, Ctrl-D   | none              | AwaitingCommand |
//! | Idle            | Ctrl-X           | exit              | Idle            |
//! | Idle            | other            | forward           | Idle            |
//! | AwaitingCommand | command letter   | run command       | Idle            |
//! | AwaitingCommand | other            | forward           | Idle            |

use crate::constants::{KEY_CTRL_A, KEY_CTRL_D, KEY_CTRL_X};

/// Interpreter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EscapeState {
    /// Bytes are forwarded.
    #[default]
    Idle,
    /// The next byte is a command letter.
    AwaitingCommand,
}

/// Commands reachable after the command key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Leave the console.
    Quit,
    /// Next faster line rate.
    SpeedUp,
    /// Next slower line rate.
    SpeedDown,
    /// Print speed, trigger and timestamp status.
    Status,
    /// Clear the screen.
    ClearScreen,
    /// Turn trigger matching on or off.
    ToggleTriggers,
    /// Print the key summary.
    Help,
    /// Turn timestamp prefixes on or off.
    ToggleTimestamps,
}

/// Letter to command table. Lookup is case-insensitive.
pub const COMMAND_KEYS: &[(u8, Command)] = &[
    (b'q', Command::Quit),
    (b'u', Command::SpeedUp),
    (b'd', Command::SpeedDown),
    (b'p', Command::Status),
    (b'c', Command::ClearScreen),
    (b'm', Command::ToggleTriggers),
    (b'h', Command::Help),
    (b't', Command::ToggleTimestamps),
];

/// Command bound to `byte`, if any.
pub fn command_for(byte: u8) -> Option<Command> {
    let key = byte.to_ascii_lowercase();
    COMMAND_KEYS
        .iter()
        .find(|(letter, _)| *letter == key)
        .map(|&(_, command)| command)
}

/// What to do with one input byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Send the byte to the device.
    Forward(u8),
    /// Command key seen; wait for the letter.
    Arm,
    /// Leave the console.
    Exit,
    /// Run a command.
    Run(Command),
}

/// One step of the state machine.
pub fn transition(state: EscapeState, byte: u8) -> (KeyAction, EscapeState) {
    match state {
        EscapeState::Idle => match byte {
            KEY_CTRL_A | KEY_CTRL_D => (KeyAction::Arm, EscapeState::AwaitingCommand),
            KEY_CTRL_X => (KeyAction::Exit, EscapeState::Idle),
            _ => (KeyAction::Forward(byte), EscapeState::Idle),
        },
        EscapeState::AwaitingCommand => {
            let action = command_for(byte).map_or(KeyAction::Forward(byte), KeyAction::Run);
            (action, EscapeState::Idle)
        }
    }
}

/// Replace every `\n` with `\r` in place.
pub fn normalize_newlines(bytes: &mut [u8]) {
    for byte in bytes.iter_mut().filter(|b| **b == b'\n') {
        *byte = b'\r';
    }
}

/// Keymap with its current state.
#[derive(Debug, Default)]
pub struct Keymap {
    state: EscapeState,
}

impl Keymap {
    /// Keymap in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> EscapeState {
        self.state
    }

    /// Feed one byte and get the action for it.
    pub fn feed(&mut self, byte: u8) -> KeyAction {
        let (action, next) = transition(self.state, byte);
        self.state = next;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_bytes_are_forwarded() {
        let mut keymap = Keymap::new();
        assert_eq!(keymap.feed(b'a'), KeyAction::Forward(b'a'));
        assert_eq!(keymap.state(), EscapeState::Idle);
    }

    #[test]
    fn test_both_command_keys_arm() {
        for key in [KEY_CTRL_A, KEY_CTRL_D] {
            let mut keymap = Keymap::new();
            assert_eq!(keymap.feed(key), KeyAction::Arm);
            assert_eq!(keymap.state(), EscapeState::AwaitingCommand);
        }
    }

    #[test]
    fn test_ctrl_x_exits_from_idle() {
        assert_eq!(
            transition(EscapeState::Idle, KEY_CTRL_X),
            (KeyAction::Exit, EscapeState::Idle)
        );
    }

    #[test]
    fn test_command_letters_are_case_insensitive() {
        for &(letter, command) in COMMAND_KEYS {
            assert_eq!(command_for(letter), Some(command));
            assert_eq!(command_for(letter.to_ascii_uppercase()), Some(command));
        }
    }

    #[test]
    fn test_clear_command_sequence() {
        let mut keymap = Keymap::new();
        assert_eq!(keymap.feed(KEY_CTRL_A), KeyAction::Arm);
        assert_eq!(keymap.feed(b'c'), KeyAction::Run(Command::ClearScreen));
        assert_eq!(keymap.state(), EscapeState::Idle);
    }

    #[test]
    fn test_unknown_letter_is_forwarded() {
        let mut keymap = Keymap::new();
        keymap.feed(KEY_CTRL_A);
        assert_eq!(keymap.feed(b'z'), KeyAction::Forward(b'z'));
        assert_eq!(keymap.state(), EscapeState::Idle);
    }

    #[test]
    fn test_command_key_twice_forwards_second() {
        let mut keymap = Keymap::new();
        keymap.feed(KEY_CTRL_A);
        assert_eq!(keymap.feed(KEY_CTRL_A), KeyAction::Forward(KEY_CTRL_A));
    }

    #[test]
    fn test_ctrl_x_after_command_key_is_forwarded() {
        let mut keymap = Keymap::new();
        keymap.feed(KEY_CTRL_D);
        assert_eq!(keymap.feed(KEY_CTRL_X), KeyAction::Forward(KEY_CTRL_X));
    }

    #[test]
    fn test_normalize_newlines() {
        let mut bytes = *b"ls\npwd\r\n";
        normalize_newlines(&mut bytes);
        assert_eq!(&bytes, b"ls\rpwd\r\r");
    }
}

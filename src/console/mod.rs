//! Foreground console loop.
//!
//! Polls the keyboard, runs each byte through the [`Keymap`], forwards
//! plain bytes to the device and executes commands. Signal events queued
//! by the forwarder thread are handled between polls.
//!
//! Forwarded bytes are batched per read and flushed to the device before
//! any command runs, so the device sees keystrokes in the order typed.

// Rust guideline compliant 2026-02

pub mod keymap;

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::constants::{HELP_TEXT, KEYBOARD_POLL_INTERVAL, KEYBOARD_READ_BUFFER, KEY_CTRL_C};
use crate::device::{LineControl, SerialLink};
use crate::screen::{self, Screen};
use crate::signals::SignalEvent;
use crate::speed;
use crate::state::RunState;
use crate::terminal::{KeyInput, KeySource};
use crate::triggers::TriggerRegistry;

pub use keymap::{Command, EscapeState, KeyAction, Keymap};

/// Keyboard-side half of a session.
pub struct Console<'a, K: KeySource, L: LineControl> {
    link: Arc<dyn SerialLink>,
    state: Arc<RunState>,
    triggers: Arc<TriggerRegistry>,
    screen: Screen,
    keys: &'a mut K,
    line: &'a mut L,
    signals: Option<Receiver<SignalEvent>>,
    keymap: Keymap,
    speed_index: usize,
}

impl<K: KeySource, L: LineControl> std::fmt::Debug for Console<'_, K, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("state", &self.state)
            .field("keymap", &self.keymap)
            .field("speed_index", &self.speed_index)
            .finish_non_exhaustive()
    }
}

impl<'a, K: KeySource, L: LineControl> Console<'a, K, L> {
    /// Console starting at speed table entry `speed_index`.
    pub fn new(
        link: Arc<dyn SerialLink>,
        state: Arc<RunState>,
        triggers: Arc<TriggerRegistry>,
        screen: Screen,
        keys: &'a mut K,
        line: &'a mut L,
        speed_index: usize,
    ) -> Self {
        Self {
            link,
            state,
            triggers,
            screen,
            keys,
            line,
            signals: None,
            keymap: Keymap::new(),
            speed_index,
        }
    }

    /// Handle events from a signal forwarder.
    pub fn with_signals(mut self, signals: Receiver<SignalEvent>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Speed table entry in effect.
    pub fn speed_index(&self) -> usize {
        self.speed_index
    }

    /// Current interpreter state.
    pub fn escape_state(&self) -> EscapeState {
        self.keymap.state()
    }

    /// Run until either side requests exit.
    pub fn run(&mut self) {
        log::info!("Console loop started");
        let mut buf = [0u8; KEYBOARD_READ_BUFFER];

        while !self.state.exit_requested() {
            match self.keys.read_keys(&mut buf, KEYBOARD_POLL_INTERVAL) {
                Ok(KeyInput::Bytes(n)) => self.handle_input(&mut buf[..n]),
                Ok(KeyInput::Idle) => {}
                Ok(KeyInput::Closed) => {
                    log::info!("Keyboard input closed");
                    self.state.request_exit();
                }
                Err(e) => {
                    log::error!("Keyboard read failed: {e}");
                    screen::emit_line(&self.screen, &format!("\nKeyboard read: {e}"));
                    self.state.request_exit();
                }
            }
            self.drain_signals();
        }

        log::info!("Console loop stopped");
    }

    /// Interpret one read's worth of keyboard bytes.
    pub fn handle_input(&mut self, bytes: &mut [u8]) {
        keymap::normalize_newlines(bytes);
        let mut pending = Vec::with_capacity(bytes.len());

        for &byte in bytes.iter() {
            match self.keymap.feed(byte) {
                KeyAction::Forward(b) => pending.push(b),
                KeyAction::Arm => {}
                KeyAction::Exit => {
                    self.forward(&pending);
                    self.state.request_exit();
                    return;
                }
                KeyAction::Run(command) => {
                    self.forward(&pending);
                    pending.clear();
                    self.execute(command);
                    if self.state.exit_requested() {
                        return;
                    }
                }
            }
        }

        self.forward(&pending);
    }

    /// Run a command-key command.
    pub fn execute(&mut self, command: Command) {
        log::debug!("Command: {command:?}");
        match command {
            Command::Quit => self.state.request_exit(),
            Command::SpeedUp => self.change_speed(speed::next_index(self.speed_index)),
            Command::SpeedDown => self.change_speed(speed::prev_index(self.speed_index)),
            Command::Status => self.print_status(),
            Command::ClearScreen => {
                if let Err(e) = screen::clear(&self.screen) {
                    log::warn!("Clear screen failed: {e}");
                }
            }
            Command::ToggleTriggers => self.toggle_triggers(),
            Command::Help => screen::emit_line(&self.screen, HELP_TEXT),
            Command::ToggleTimestamps => {
                let enabled = self.state.toggle_timestamps();
                screen::emit_line(
                    &self.screen,
                    &format!(
                        "\n{}{}",
                        screen::bold("Timestamp is now: "),
                        screen::status_word(enabled)
                    ),
                );
            }
        }
    }

    fn forward(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        if let Err(e) = self.link.write_bytes(bytes) {
            log::error!("Serial port write failed: {e}");
            screen::emit_line(&self.screen, "Serial port write access error");
        }
    }

    fn change_speed(&mut self, index: usize) {
        match self.line.apply_speed(index) {
            Ok(()) => {
                self.speed_index = index;
                screen::emit_line(
                    &self.screen,
                    &format!(
                        "\nNew speed set to {} bps",
                        screen::bold(&speed::rate(index).to_string())
                    ),
                );
            }
            Err(e) => {
                log::error!("Speed change to {} failed: {e}", speed::rate(index));
                screen::emit_line(
                    &self.screen,
                    &format!(
                        "\nUnable to set speed {} ({e}), staying at {}",
                        speed::rate(index),
                        speed::rate(self.speed_index)
                    ),
                );
            }
        }
    }

    fn print_status(&self) {
        let status = format!(
            "{}{}\n{}{}\n{}{}",
            screen::bold("Current speed: "),
            speed::rate(self.speed_index),
            screen::bold("TTC is: "),
            screen::status_word(self.state.triggers_enabled()),
            screen::bold("Timestamp is: "),
            screen::status_word(self.state.timestamps_enabled()),
        );
        screen::emit_line(&self.screen, &status);
    }

    fn toggle_triggers(&mut self) {
        if self.state.triggers_enabled() {
            self.state.set_triggers(false);
            self.triggers.clear();
        } else {
            if let Some(path) = self.triggers.source() {
                match self.triggers.reload() {
                    Ok(count) => screen::emit_line(
                        &self.screen,
                        &format!(
                            "\nFound {count} valid trigger(s) in file: {}",
                            path.display()
                        ),
                    ),
                    Err(e) => {
                        log::warn!("Trigger reload failed: {e}");
                        screen::emit_line(&self.screen, &format!("\n{e}"));
                    }
                }
            }
            self.state.set_triggers(true);
        }

        screen::emit_line(
            &self.screen,
            &format!(
                "\n{}{}",
                screen::bold("Trigger to command is now: "),
                screen::status_word(self.state.triggers_enabled())
            ),
        );
    }

    fn drain_signals(&mut self) {
        let Some(signals) = &self.signals else {
            return;
        };
        let events: Vec<SignalEvent> = signals.try_iter().collect();

        for event in events {
            match event {
                SignalEvent::Interrupt => self.forward(&[KEY_CTRL_C]),
                SignalEvent::Terminate => {
                    log::info!("Terminate signal received");
                    self.state.request_exit();
                }
            }
        }
    }
}

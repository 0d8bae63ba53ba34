//! One console session: reader thread plus console loop.
//!
//! Owns the line-mode and keyboard restorers for the lifetime of the
//! session. Both sit in `scopeguard`s, so they run on normal exit, on an
//! early `?` return and while unwinding from a panic. The keyboard guard
//! is declared last and therefore restored first.

// Rust guideline compliant 2026-02

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::console::Console;
use crate::device::{LineControl, SerialLink};
use crate::reader::{spawn_reader_thread, ReaderContext, ReaderExit};
use crate::screen::Screen;
use crate::signals::SignalEvent;
use crate::state::RunState;
use crate::terminal::{KeySource, TerminalRestore};
use crate::triggers::TriggerRegistry;

/// Everything a session needs, already set up.
pub struct Session<K, L, T> {
    /// Device link shared with the reader thread.
    pub link: Arc<dyn SerialLink>,
    /// Keystroke source.
    pub keys: K,
    /// Line configuration; restored when the session ends.
    pub line: L,
    /// Keyboard configuration; restored when the session ends.
    pub keyboard: T,
    /// Shared flags.
    pub state: Arc<RunState>,
    /// Live trigger rules.
    pub triggers: Arc<TriggerRegistry>,
    /// Output sink.
    pub screen: Screen,
    /// Signal events, if a forwarder is running.
    pub signals: Option<Receiver<SignalEvent>>,
    /// Speed table entry already applied to the line.
    pub speed_index: usize,
    /// Inter-byte delay for trigger responses.
    pub pacing: Duration,
}

impl<K, L, T> std::fmt::Debug for Session<K, L, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("speed_index", &self.speed_index)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl<K, L, T> Session<K, L, T>
where
    K: KeySource,
    L: LineControl,
    T: TerminalRestore,
{
    /// Run both loops until exit and tear down.
    ///
    /// Returns why the reader stopped.
    pub fn run(self) -> Result<ReaderExit> {
        let Self {
            link,
            mut keys,
            line,
            keyboard,
            state,
            triggers,
            screen,
            signals,
            speed_index,
            pacing,
        } = self;

        let mut line = scopeguard::guard(line, |mut line| {
            if let Err(e) = line.restore() {
                log::warn!("Failed to restore line settings: {e}");
            }
        });
        let _keyboard = scopeguard::guard(keyboard, |mut keyboard| {
            if let Err(e) = keyboard.restore() {
                log::warn!("Failed to restore keyboard: {e}");
            }
        });

        let reader = spawn_reader_thread(ReaderContext {
            link: Arc::clone(&link),
            state: Arc::clone(&state),
            triggers: Arc::clone(&triggers),
            screen: Arc::clone(&screen),
            pacing,
        })
        .context("Failed to spawn reader thread")?;

        // Stops the reader if the console loop unwinds.
        let stop_reader = scopeguard::guard((Arc::clone(&state), Arc::clone(&link)), |(state, link)| {
            state.request_exit();
            link.wake();
        });

        let mut console = Console::new(
            Arc::clone(&link),
            Arc::clone(&state),
            triggers,
            screen,
            &mut keys,
            &mut *line,
            speed_index,
        );
        if let Some(signals) = signals {
            console = console.with_signals(signals);
        }
        console.run();
        drop(console);

        drop(stop_reader);
        let exit = reader.join().unwrap_or(ReaderExit::Panicked);
        log::info!("Session ended: {exit:?}");
        Ok(exit)
    }
}

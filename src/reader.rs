//! Background device reader.
//!
//! Runs on its own thread for the whole session. Each chunk read from the
//! device goes through the same steps:
//!
//! ```text
//! read ─▶ reload rules if the file changed
//!      ─▶ timestamp prefix (optional)
//!      ─▶ screen
//!      ─▶ trigger matching (optional) ─▶ responses written to the device
//! ```
//!
//! The loop ends on a device fault, a fatal read error, or a shutdown
//! request from the console. Whatever the reason, it leaves
//! `exit_requested` set so the console winds down too.

// Rust guideline compliant 2026-02

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};

use crate::constants::{DEVICE_READ_BUFFER, TIMESTAMP_FORMAT};
use crate::device::{Readiness, SerialLink};
use crate::screen::{self, Screen};
use crate::state::RunState;
use crate::triggers::{match_and_respond, TriggerRegistry};

/// Everything the reader thread needs.
#[derive(Clone)]
pub struct ReaderContext {
    /// Device link.
    pub link: Arc<dyn SerialLink>,
    /// Shared flags.
    pub state: Arc<RunState>,
    /// Live trigger rules.
    pub triggers: Arc<TriggerRegistry>,
    /// Output sink.
    pub screen: Screen,
    /// Inter-byte delay for trigger responses.
    pub pacing: Duration,
}

impl std::fmt::Debug for ReaderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderContext")
            .field("state", &self.state)
            .field("rules", &self.triggers.len())
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

/// Why the reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Shutdown was requested.
    Requested,
    /// The device reported an error or hangup condition.
    DeviceFault,
    /// A read failed with a non-transient error.
    ReadFailed,
    /// Writing a trigger response failed.
    WriteFailed,
    /// The reader thread panicked.
    Panicked,
}

impl ReaderExit {
    /// Whether the session ended because of the device.
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::Requested)
    }
}

/// Start the reader on a named thread.
pub fn spawn_reader_thread(ctx: ReaderContext) -> io::Result<JoinHandle<ReaderExit>> {
    thread::Builder::new()
        .name("serial-reader".to_string())
        .spawn(move || {
            let state = Arc::clone(&ctx.state);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_reader(&ctx)));
            state.request_exit();
            outcome.unwrap_or(ReaderExit::Panicked)
        })
}

/// Reader loop. Returns when the session is over.
pub fn run_reader(ctx: &ReaderContext) -> ReaderExit {
    log::info!("Reader thread started");
    let exit = read_loop(ctx);
    ctx.state.request_exit();
    log::info!("Reader thread stopped: {exit:?}");
    exit
}

fn read_loop(ctx: &ReaderContext) -> ReaderExit {
    let mut buf = vec![0u8; DEVICE_READ_BUFFER];

    while !ctx.state.exit_requested() {
        match ctx.link.wait_readable() {
            Ok(Readiness::Data) => {}
            Ok(Readiness::Wake) => continue,
            Ok(Readiness::Fault { revents }) => {
                log::error!("Serial port poll error (revents=0x{revents:x})");
                screen::emit_line(&ctx.screen, "\nSerial port poll error");
                return ReaderExit::DeviceFault;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("Serial port poll failed: {e}");
                screen::emit_line(&ctx.screen, &format!("\nSerial port poll: {e}"));
                return ReaderExit::DeviceFault;
            }
        }

        let n = match ctx.link.read_chunk(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if is_transient(&e) => continue,
            Err(e) => {
                log::error!("Serial port read failed: {e}");
                screen::emit_line(&ctx.screen, &format!("\nSerial port read: {e}"));
                return ReaderExit::ReadFailed;
            }
        };

        if let Err(exit) = process_chunk(ctx, &buf[..n]) {
            return exit;
        }
    }

    ReaderExit::Requested
}

/// Interrupted and would-block reads are retried silently.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

fn process_chunk(ctx: &ReaderContext, chunk: &[u8]) -> Result<(), ReaderExit> {
    let triggers_on = ctx.state.triggers_enabled();

    if triggers_on && ctx.triggers.check_modified() {
        match ctx.triggers.reload() {
            Ok(count) => screen::emit_line(
                &ctx.screen,
                &format!("\nTrigger file changed, {count} trigger(s) reloaded"),
            ),
            Err(e) => {
                log::warn!("Trigger reload failed: {e}");
                screen::emit_line(&ctx.screen, &format!("\n{e}"));
            }
        }
    }

    let mut out = Vec::with_capacity(chunk.len() + TIMESTAMP_FORMAT.len() + 8);
    if ctx.state.timestamps_enabled() {
        out.extend_from_slice(timestamp_prefix(&Local::now()).as_bytes());
    }
    out.extend_from_slice(chunk);
    if let Err(e) = screen::emit(&ctx.screen, &out) {
        log::warn!("Screen write failed: {e}");
    }

    if !triggers_on {
        return Ok(());
    }
    let rules = ctx.triggers.snapshot();
    if rules.is_empty() {
        return Ok(());
    }

    match match_and_respond(chunk, &rules, ctx.link.as_ref(), ctx.pacing) {
        Ok(fired) => {
            for rule in fired {
                screen::emit_line(
                    &ctx.screen,
                    &format!(
                        "\nTrigger: {} command: {}",
                        rule.trigger_text(),
                        rule.response_text()
                    ),
                );
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Serial port write failed: {e}");
            screen::emit_line(&ctx.screen, &format!("\nSerial port write: {e}"));
            Err(ReaderExit::WriteFailed)
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS | ` for `now`.
pub fn timestamp_prefix<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(TIMESTAMP_FORMAT).to_string()
}

//! Signal forwarding.
//!
//! A helper thread waits on `signal-hook`'s iterator and turns each
//! delivered signal into a [`SignalEvent`] on a channel. The console drains
//! the channel between keyboard polls, so nothing runs in signal context.

use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

/// A signal the console has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGINT: send an interrupt byte to the device.
    Interrupt,
    /// SIGTERM or SIGHUP: shut down.
    Terminate,
}

/// Map a signal number to an event.
pub fn classify(signal: i32) -> Option<SignalEvent> {
    match signal {
        SIGINT => Some(SignalEvent::Interrupt),
        SIGTERM | SIGHUP => Some(SignalEvent::Terminate),
        _ => None,
    }
}

/// Register handlers and start the forwarding thread.
pub fn spawn_signal_forwarder() -> Result<Receiver<SignalEvent>> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM, SIGHUP]).context("Failed to register signal handlers")?;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("signal-forwarder".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let Some(event) = classify(signal) else {
                    continue;
                };
                log::info!("Received signal {signal}, forwarding {event:?}");
                if tx.send(event).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal thread")?;

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_classify() {
        assert_eq!(classify(SIGINT), Some(SignalEvent::Interrupt));
        assert_eq!(classify(SIGTERM), Some(SignalEvent::Terminate));
        assert_eq!(classify(SIGHUP), Some(SignalEvent::Terminate));
        assert_eq!(classify(libc::SIGUSR1), None);
    }

    #[test]
    fn test_sigint_is_forwarded_as_interrupt() {
        let rx = spawn_signal_forwarder().unwrap();
        signal_hook::low_level::raise(SIGINT).unwrap();
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event, SignalEvent::Interrupt);
    }
}

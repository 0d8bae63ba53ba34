//! Run state shared by the reader thread and the console loop.
//!
//! All flags are atomics. `exit_requested` is written by both threads;
//! the timestamp and trigger flags are written by the console only and
//! read by the reader once per chunk.

use std::sync::atomic::{AtomicBool, Ordering};

/// Flags visible to both threads of a session.
#[derive(Debug, Default)]
pub struct RunState {
    exit_requested: AtomicBool,
    timestamps: AtomicBool,
    triggers: AtomicBool,
}

impl RunState {
    /// Create a state with every flag cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask both loops to wind down.
    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::Release);
    }

    /// Whether either loop has asked for shutdown.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::Acquire)
    }

    /// Whether device output gets a wall-clock prefix.
    pub fn timestamps_enabled(&self) -> bool {
        self.timestamps.load(Ordering::Relaxed)
    }

    /// Set timestamp mode.
    pub fn set_timestamps(&self, enabled: bool) {
        self.timestamps.store(enabled, Ordering::Relaxed);
    }

    /// Flip timestamp mode, returning the new value.
    pub fn toggle_timestamps(&self) -> bool {
        !self.timestamps.fetch_xor(true, Ordering::Relaxed)
    }

    /// Whether trigger matching runs on device output.
    pub fn triggers_enabled(&self) -> bool {
        self.triggers.load(Ordering::Acquire)
    }

    /// Set trigger matching.
    pub fn set_triggers(&self, enabled: bool) {
        self.triggers.store(enabled, Ordering::Release);
    }
}

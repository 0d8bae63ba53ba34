//! ucon - serial console with trigger-to-command automation.
//!
//! Bridges the keyboard and screen to a serial device. Bytes typed go to
//! the device; bytes from the device go to the screen. Trigger rules loaded
//! from a file watch the device output and answer matches automatically.
//!
//! # Architecture
//!
//! ```text
//! main thread                         serial-reader thread
//! ───────────                         ────────────────────
//! console::Console                    reader::run_reader
//!   keyboard ─▶ keymap ─▶ device        device ─▶ screen
//!   commands ─▶ line mode / flags       device ─▶ triggers ─▶ device
//!              │                                │
//!              └──── state::RunState ───────────┘
//!                    triggers::TriggerRegistry (ArcSwap)
//! ```

// Rust guideline compliant 2026-02

pub mod config;
pub mod console;
pub mod constants;
pub mod device;
pub mod reader;
pub mod screen;
pub mod session;
pub mod signals;
pub mod speed;
pub mod state;
pub mod terminal;
pub mod triggers;

pub use config::Config;
pub use device::{Device, DeviceError, LineControl, LineModeController, LineModeError, SerialLink};
pub use reader::ReaderExit;
pub use session::Session;
pub use state::RunState;
pub use triggers::{TriggerFileError, TriggerRegistry, TriggerRule, TriggerSet};

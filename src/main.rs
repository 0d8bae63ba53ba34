//! ucon - micro console for high speed serial ports.
//!
//! This is the binary entry point. See the `ucon` library for the
//! session machinery.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use mimalloc::MiMalloc;

use ucon::constants::{BANNER_RULE, RESET_PULSE};
use ucon::screen::{self, Screen};
use ucon::terminal::{KeyboardMode, StdinKeys};
use ucon::{
    signals, speed, Config, Device, DeviceError, LineControl, LineModeController, RunState,
    SerialLink, Session, TriggerRegistry,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const USAGE: &str = "\nucon - micro console for high speed serial ports\n\
Usage: ucon <device> [speed] [trigger_file]\n\
Supported speeds 50 bps - 4 Mbps\n\
Default speed is 115200 bps\n\
Examples:\n  \
ucon /dev/ttyUSB0 115200\n  \
ucon /dev/ttyUSB0 921600 trigger_to_command.txt";

#[derive(Parser, Debug)]
#[command(
    name = "ucon",
    version,
    about = "Micro console for high speed serial ports",
    after_help = "Exit: Ctrl-X or Ctrl-A Q. Commands: Ctrl-A or Ctrl-D followed by a letter, Ctrl-A H for help."
)]
struct Cli {
    /// Serial device, e.g. /dev/ttyUSB0
    device: Option<PathBuf>,
    /// Line speed in bps; rounded up to the next supported rate
    speed: Option<u32>,
    /// Trigger-to-command file: alternating trigger and response lines
    trigger_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_logging();

    // Set up panic hook to log panics before the default handler runs
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        log::error!("PANIC: {:?}", panic_info);
        default_hook(panic_info);
    }));

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    let Some(device) = cli.device else {
        eprintln!("{USAGE}");
        return ExitCode::from(1);
    };

    match run(&device, cli.speed, cli.trigger_file.as_deref()) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("{e:#}");
            let code = e.downcast_ref::<DeviceError>().map_or(1, DeviceError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Log to a file so log lines never mix with the device stream.
///
/// Uses `UCON_LOG_FILE`, else `UCON_CONFIG_DIR/ucon.log`, else `/tmp/ucon.log`.
fn init_logging() {
    let log_path = if let Ok(path) = std::env::var("UCON_LOG_FILE") {
        PathBuf::from(path)
    } else if let Ok(config_dir) = std::env::var("UCON_CONFIG_DIR") {
        PathBuf::from(config_dir).join("ucon.log")
    } else {
        PathBuf::from("/tmp/ucon.log")
    };

    let log_file = match std::fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Logging disabled, cannot create {}: {e}", log_path.display());
            return;
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .format_timestamp_secs()
        .init();
}

fn run(device_path: &Path, speed_arg: Option<u32>, trigger_file: Option<&Path>) -> Result<ExitCode> {
    let config = Config::load();
    log::info!("Starting ucon with {config:?}");

    let state = Arc::new(RunState::new());
    state.set_timestamps(config.timestamps);
    let screen = screen::stderr_screen();

    let triggers = Arc::new(load_triggers(trigger_file, &config, &state));
    let speed_index = speed::find_speed(speed_arg.unwrap_or(config.default_speed));
    print_banner(&screen, device_path, speed_index);

    let device = Arc::new(Device::open(device_path)?);
    let mut line = LineModeController::capture(Arc::clone(&device))
        .context("Unable to save terminal settings")?;
    let prepared = set_initial_speed(&mut line, speed_index, config.latch_baseline)
        .and_then(|()| drain_with_reset(&device, &screen, config.auto_reset));
    if let Err(e) = prepared {
        if let Err(restore_err) = line.restore() {
            log::warn!("Failed to restore line settings: {restore_err}");
        }
        return Err(e);
    }

    let keyboard = KeyboardMode::enter().unwrap_or_else(|e| {
        log::warn!("Keyboard left in its current mode: {e}");
        KeyboardMode::inactive()
    });
    let signals = match signals::spawn_signal_forwarder() {
        Ok(rx) => Some(rx),
        Err(e) => {
            log::warn!("Signals not forwarded: {e:#}");
            None
        }
    };

    let link: Arc<dyn SerialLink> = device;
    let exit = Session {
        link,
        keys: StdinKeys::new(),
        line,
        keyboard,
        state,
        triggers,
        screen,
        signals,
        speed_index,
        pacing: config.response_pacing(),
    }
    .run()?;

    println!("\nConsole restored");
    Ok(if exit.is_failure() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn set_initial_speed(line: &mut LineModeController, index: usize, latch_baseline: bool) -> Result<()> {
    if latch_baseline {
        line.apply_speed(speed::BASELINE_SPEED_INDEX)
            .context("Failed to apply baseline speed")?;
    }
    line.apply_speed(index)
        .with_context(|| format!("Failed to set speed {}", speed::rate(index)))?;
    Ok(())
}

fn load_triggers(path: Option<&Path>, config: &Config, state: &RunState) -> TriggerRegistry {
    let (registry, err) = TriggerRegistry::at_startup(path, state);
    if let Some(e) = err {
        eprintln!("{e}");
        return registry;
    }
    let Some(path) = registry.source() else {
        return registry;
    };

    println!(
        "\n{}",
        screen::bold(&format!(
            "Found {} valid trigger(s) in file: {}",
            registry.len(),
            path.display()
        ))
    );
    if config.show_triggers {
        for (i, rule) in registry.snapshot().rules().iter().enumerate() {
            println!(
                "TTC#{i:02}: [{}] -> [{}]",
                rule.trigger_text(),
                rule.response_text()
            );
        }
    }
    registry
}

/// Hold the target in reset while stale input is drained.
fn drain_with_reset(device: &Device, screen: &Screen, auto_reset: bool) -> Result<()> {
    if !auto_reset {
        device.drain_input();
        return Ok(());
    }

    device.set_dtr(true)?;
    screen::emit_line(screen, "Reset_N (DTR) asserted");
    std::thread::sleep(RESET_PULSE);
    device.drain_input();
    device.set_dtr(false)?;
    screen::emit_line(screen, "Reset_N (DTR) deasserted");
    Ok(())
}

fn print_banner(screen: &Screen, device: &Path, speed_index: usize) {
    let banner = format!(
        "{BANNER_RULE}\n\
         Serial port: {} ({} bps 8N1)\n\n\
         Exit: Ctrl-X or Ctrl-A Q  TTC: Ctrl-A M\n\
         Speed: Ctrl-A U (up) or Ctrl-A D (down)\n\
         Help: Ctrl-A H\n\
         {BANNER_RULE}\n",
        device.display(),
        speed::rate(speed_index)
    );
    screen::emit_line(screen, &banner);
}

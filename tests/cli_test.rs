// Exit-code tests for the ucon binary.
// Run with: cargo test --test cli_test

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::process::{Command, Output, Stdio};

use portable_pty::{native_pty_system, PtySize};
use tempfile::TempDir;

fn ucon(args: &[&str], config_dir: &TempDir) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ucon"))
        .args(args)
        .env("UCON_CONFIG_DIR", config_dir.path())
        .env("UCON_LOG_FILE", config_dir.path().join("test.log"))
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute ucon")
}

#[test]
fn test_missing_device_prints_usage() {
    let dir = TempDir::new().unwrap();
    let output = ucon(&[], &dir);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage: ucon <device>"), "stderr: {stderr}");
}

#[test]
fn test_unopenable_device_exits_one() {
    let dir = TempDir::new().unwrap();
    let output = ucon(&["/nonexistent/ttyUSB99", "115200"], &dir);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Serial port open"), "stderr: {stderr}");
}

#[test]
fn test_version_exits_zero() {
    let dir = TempDir::new().unwrap();
    let output = ucon(&["--version"], &dir);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ucon"));
}

#[test]
fn test_help_lists_arguments() {
    let dir = TempDir::new().unwrap();
    let output = ucon(&["--help"], &dir);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DEVICE"));
    assert!(stdout.contains("TRIGGER_FILE"));
}

#[test]
fn test_invalid_speed_exits_one() {
    let dir = TempDir::new().unwrap();
    let output = ucon(&["/dev/null", "fast"], &dir);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_locked_device_exits_two() {
    let dir = TempDir::new().unwrap();
    let pair = native_pty_system()
        .openpty(PtySize::default())
        .expect("Failed to open pty");
    let slave_path = pair.master.tty_name().expect("pty has no tty name");

    let holder = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&slave_path)
        .expect("open pty slave");
    // SAFETY: holder is an open read/write descriptor.
    let locked = unsafe { libc::lockf(holder.as_raw_fd(), libc::F_TLOCK, 1) };
    assert_eq!(locked, 0, "could not take the test lock");

    let output = ucon(&[slave_path.to_str().unwrap()], &dir);

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("locked"), "stderr: {stderr}");
    drop(holder);
}

#[test]
fn test_trigger_file_is_listed_before_open() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("ttc.txt");
    std::fs::write(&rules, "login:\nroot\n").unwrap();

    let output = ucon(
        &["/nonexistent/ttyUSB99", "9600", rules.to_str().unwrap()],
        &dir,
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Found 1 valid trigger(s)"), "stdout: {stdout}");
    assert!(stdout.contains("TTC#00: [login:] -> [root]"), "stdout: {stdout}");
}

#[test]
fn test_unreadable_trigger_file_is_reported_and_skipped() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.txt");

    let output = ucon(
        &["/nonexistent/ttyUSB99", "9600", missing.to_str().unwrap()],
        &dir,
    );

    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Cannot read trigger file"), "stderr: {stderr}");
    assert!(!stdout.contains("valid trigger(s)"), "stdout: {stdout}");
    assert!(stderr.contains("Serial port open"), "stderr: {stderr}");
}

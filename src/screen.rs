//! Shared output sink for device bytes and console messages.
//!
//! Both threads write to the same [`Screen`]. Every write takes the lock
//! for one whole message so reader output and status reports never
//! interleave inside a line.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crossterm::{
    cursor::MoveTo,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{Clear, ClearType},
    QueueableCommand,
};

/// Screen handle shared between the reader thread and the console.
pub type Screen = Arc<Mutex<dyn Write + Send>>;

/// Screen backed by the process's stderr.
pub fn stderr_screen() -> Screen {
    Arc::new(Mutex::new(io::stderr()))
}

/// Write `bytes` verbatim and flush.
pub fn emit(screen: &Screen, bytes: &[u8]) -> io::Result<()> {
    let mut out = screen.lock().unwrap_or_else(PoisonError::into_inner);
    out.write_all(bytes)?;
    out.flush()
}

/// Write `text` followed by a line end.
///
/// Keyboard mode only clears `ICANON` and `ECHO`, so output post-processing
/// stays on and the terminal turns each `\n` into `\r\n` itself.
pub fn emit_line(screen: &Screen, text: &str) {
    let mut line = text.as_bytes().to_vec();
    line.push(b'\n');
    if let Err(e) = emit(screen, &line) {
        log::warn!("Screen write failed: {e}");
    }
}

/// Move the cursor home and clear everything below it.
pub fn clear(screen: &Screen) -> io::Result<()> {
    let mut buf = Vec::new();
    buf.queue(MoveTo(0, 0))?.queue(Clear(ClearType::FromCursorDown))?;
    emit(screen, &buf)
}

/// `enabled`/`disabled` rendered green or red.
pub fn status_word(enabled: bool) -> String {
    let (color, word) = if enabled {
        (Color::Green, "enabled")
    } else {
        (Color::Red, "disabled")
    };
    styled(word, Some(color), false)
}

/// `text` rendered bold.
pub fn bold(text: &str) -> String {
    styled(text, None, true)
}

fn styled(text: &str, color: Option<Color>, bold: bool) -> String {
    let mut buf = Vec::new();
    // Queueing into a Vec cannot fail.
    let _ = render(&mut buf, text, color, bold);
    String::from_utf8_lossy(&buf).into_owned()
}

fn render(buf: &mut Vec<u8>, text: &str, color: Option<Color>, bold: bool) -> io::Result<()> {
    if bold {
        buf.queue(SetAttribute(Attribute::Bold))?;
    }
    if let Some(color) = color {
        buf.queue(SetForegroundColor(color))?;
    }
    buf.queue(Print(text))?;
    if color.is_some() {
        buf.queue(ResetColor)?;
    }
    if bold {
        buf.queue(SetAttribute(Attribute::Reset))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> (Screen, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let screen: Screen = buf.clone();
        (screen, buf)
    }

    #[test]
    fn test_emit_line_leaves_newlines_to_the_terminal() {
        let (screen, buf) = capture();
        emit_line(&screen, "one\ntwo");
        assert_eq!(&*buf.lock().unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn test_clear_homes_and_clears_below() {
        let (screen, buf) = capture();
        clear(&screen).unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"\x1b[1;1H\x1b[J");
    }

    #[test]
    fn test_status_word_keeps_plain_text() {
        assert!(status_word(true).contains("enabled"));
        assert!(status_word(false).contains("disabled"));
        assert_ne!(status_word(true), "enabled");
    }

    #[test]
    fn test_bold_wraps_text() {
        let text = bold("ucon");
        assert!(text.starts_with("\x1b["));
        assert!(text.contains("ucon"));
    }
}

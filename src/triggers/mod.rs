//! Trigger-to-command rules.
//!
//! A trigger file holds alternating lines: a substring to watch for in
//! device output, then the response to send back when it shows up.
//!
//! ```text
//! login:
//! root
//! Password:
//! secret
//! ```
//!
//! The registry keeps the parsed rules in an [`ArcSwap`], so the reader
//! thread always sees either the old set or the new set in full. A reload
//! builds a fresh [`TriggerSet`] and swaps the pointer.

pub mod matcher;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::constants::{MAX_RULE_LEN, MIN_TRIGGER_LEN};
use crate::state::RunState;

pub use matcher::match_and_respond;

/// Errors from reading a trigger file.
#[derive(Debug, Error)]
pub enum TriggerFileError {
    /// The file could not be read.
    #[error("Cannot read trigger file {}: {source}", path.display())]
    Read {
        /// Trigger file path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// Reload requested but no file was ever given.
    #[error("No trigger file configured")]
    NoSource,
}

/// One watch-for substring and the bytes sent back when it is seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRule {
    /// Substring searched for in device output.
    pub trigger: Vec<u8>,
    /// Bytes written to the device on a match.
    pub response: Vec<u8>,
}

impl TriggerRule {
    /// Trigger as lossy UTF-8, for display.
    pub fn trigger_text(&self) -> String {
        String::from_utf8_lossy(&self.trigger).into_owned()
    }

    /// Response as lossy UTF-8, for display.
    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.response).into_owned()
    }
}

/// Immutable, ordered rule list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerSet {
    rules: Vec<TriggerRule>,
}

impl TriggerSet {
    /// Parse trigger file contents.
    ///
    /// Lines shorter than the minimum trigger length are skipped while
    /// looking for a trigger. A trigger with no following line, or with an
    /// empty one, ends parsing; the rules before it are kept.
    pub fn parse(contents: &[u8]) -> Self {
        let mut lines = contents.split(|&b| b == b'\n').map(clean_line);
        // A trailing '\n' yields one empty slice at the end; it reads as EOF.
        let mut rules = Vec::new();

        while let Some(trigger) = lines.next() {
            if trigger.len() < MIN_TRIGGER_LEN {
                continue;
            }
            match lines.next() {
                Some(response) if !response.is_empty() => rules.push(TriggerRule {
                    trigger: trigger.to_vec(),
                    response: response.to_vec(),
                }),
                _ => break,
            }
        }

        Self { rules }
    }

    /// Rules in file order.
    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Strip the line terminator and cap the length.
fn clean_line(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    &line[..line.len().min(MAX_RULE_LEN)]
}

/// Live rule set plus where it came from.
#[derive(Debug)]
pub struct TriggerRegistry {
    current: ArcSwap<TriggerSet>,
    source: Option<PathBuf>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl TriggerRegistry {
    /// Registry with no rules and no file.
    pub fn empty() -> Self {
        Self {
            current: ArcSwap::from_pointee(TriggerSet::default()),
            source: None,
            last_modified: Mutex::new(None),
        }
    }

    /// Load rules from `path` and remember it for later reloads.
    ///
    /// The file's modification time at load becomes the baseline for
    /// [`check_modified`](Self::check_modified).
    pub fn load(path: &Path) -> Result<Self, TriggerFileError> {
        let registry = Self {
            current: ArcSwap::from_pointee(TriggerSet::default()),
            source: Some(path.to_path_buf()),
            last_modified: Mutex::new(None),
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Rules for a session from the file named at startup, if any.
    ///
    /// A readable file turns triggers on. A file that cannot be read
    /// yields an empty registry with no source, so the feature stays off
    /// for the run and toggling it on cannot bring it back; the error is
    /// handed back for the caller to report.
    pub fn at_startup(path: Option<&Path>, state: &RunState) -> (Self, Option<TriggerFileError>) {
        let Some(path) = path else {
            return (Self::empty(), None);
        };
        match Self::load(path) {
            Ok(registry) => {
                state.set_triggers(true);
                (registry, None)
            }
            Err(e) => {
                log::warn!("Triggers disabled for this run: {e}");
                (Self::empty(), Some(e))
            }
        }
    }

    /// Trigger file path, if one was given.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The rule set in effect right now.
    pub fn snapshot(&self) -> Arc<TriggerSet> {
        self.current.load_full()
    }

    /// Number of rules in effect.
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Whether no rules are in effect.
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Re-read the source file and swap in the new rules.
    ///
    /// On failure the rules in effect are left untouched.
    pub fn reload(&self) -> Result<usize, TriggerFileError> {
        let path = self.source.as_deref().ok_or(TriggerFileError::NoSource)?;
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        let contents = fs::read(path).map_err(|source| TriggerFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let set = TriggerSet::parse(&contents);
        let count = set.len();
        self.current.store(Arc::new(set));
        self.record_modified(modified);

        log::info!("Loaded {count} trigger rule(s) from {}", path.display());
        Ok(count)
    }

    /// Drop every rule. The source path is kept.
    pub fn clear(&self) {
        self.current.store(Arc::new(TriggerSet::default()));
        log::info!("Trigger rules cleared");
    }

    /// Whether the source file changed since it was last seen.
    ///
    /// True only for a successful stat reporting a strictly newer
    /// modification time; the new time is remembered.
    pub fn check_modified(&self) -> bool {
        let Some(path) = self.source.as_deref() else {
            return false;
        };
        let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
            return false;
        };

        let mut last = self.lock_modified();
        match *last {
            Some(seen) if modified <= seen => false,
            Some(_) => {
                *last = Some(modified);
                true
            }
            None => {
                *last = Some(modified);
                false
            }
        }
    }

    /// Remember the file's modification time. A failed stat keeps the
    /// last known time so a later edit still reads as a change.
    fn record_modified(&self, modified: Option<SystemTime>) {
        if let Some(modified) = modified {
            *self.lock_modified() = Some(modified);
        }
    }

    fn lock_modified(&self) -> std::sync::MutexGuard<'_, Option<SystemTime>> {
        self.last_modified
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn rule(trigger: &str, response: &str) -> TriggerRule {
        TriggerRule {
            trigger: trigger.as_bytes().to_vec(),
            response: response.as_bytes().to_vec(),
        }
    }

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_dangling_trigger_is_ignored() {
        let set = TriggerSet::parse(b"AT\nOK\nPING\n");
        assert_eq!(set.rules(), &[rule("AT", "OK")]);
    }

    #[test]
    fn test_pairs_in_file_order() {
        let set = TriggerSet::parse(b"login:\nroot\nPassword:\nsecret\n");
        assert_eq!(set.rules(), &[rule("login:", "root"), rule("Password:", "secret")]);
    }

    #[test]
    fn test_short_lines_skipped_without_consuming_response() {
        let set = TriggerSet::parse(b"\nx\nAT\nOK\n");
        assert_eq!(set.rules(), &[rule("AT", "OK")]);
    }

    #[test]
    fn test_empty_response_ends_parsing() {
        let set = TriggerSet::parse(b"AT\nOK\nBOOT\n\nlogin\nroot\n");
        assert_eq!(set.rules(), &[rule("AT", "OK")]);
    }

    #[test]
    fn test_crlf_lines_match_lf_lines() {
        assert_eq!(
            TriggerSet::parse(b"AT\r\nOK\r\n"),
            TriggerSet::parse(b"AT\nOK\n")
        );
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let long = "A".repeat(MAX_RULE_LEN + 100);
        let set = TriggerSet::parse(format!("{long}\nOK\n").as_bytes());
        assert_eq!(set.rules()[0].trigger.len(), MAX_RULE_LEN);
    }

    #[test]
    fn test_no_final_newline() {
        let set = TriggerSet::parse(b"AT\nOK");
        assert_eq!(set.rules(), &[rule("AT", "OK")]);
    }

    #[test]
    fn test_empty_file_loads_zero_rules() {
        let file = write_file("");
        let registry = TriggerRegistry::load(file.path()).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.source(), Some(file.path()));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = TriggerRegistry::load(Path::new("/nonexistent/triggers.txt")).unwrap_err();
        assert!(matches!(err, TriggerFileError::Read { .. }));
    }

    #[test]
    fn test_reload_without_source_fails() {
        let registry = TriggerRegistry::empty();
        assert!(matches!(registry.reload(), Err(TriggerFileError::NoSource)));
    }

    #[test]
    fn test_reload_failure_keeps_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ttc.txt");
        fs::write(&path, "AT\nOK\n").unwrap();
        let registry = TriggerRegistry::load(&path).unwrap();

        fs::remove_file(&path).unwrap();
        assert!(registry.reload().is_err());
        assert_eq!(registry.snapshot().rules(), &[rule("AT", "OK")]);
    }

    #[test]
    fn test_clear_then_reload_restores_rules() {
        let file = write_file("AT\nOK\nRING\nATA\n");
        let registry = TriggerRegistry::load(file.path()).unwrap();
        let before = registry.snapshot();

        registry.clear();
        assert!(registry.is_empty());
        registry.reload().unwrap();
        assert_eq!(*registry.snapshot(), *before);
    }

    #[test]
    fn test_first_check_after_load_is_quiet() {
        let file = write_file("AT\nOK\n");
        let registry = TriggerRegistry::load(file.path()).unwrap();
        assert!(!registry.check_modified());
    }

    #[test]
    fn test_newer_mtime_is_detected_once() {
        let file = write_file("AT\nOK\n");
        let registry = TriggerRegistry::load(file.path()).unwrap();

        let later = SystemTime::now() + Duration::from_secs(60);
        File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(registry.check_modified());
        assert!(!registry.check_modified());
    }

    #[test]
    fn test_older_mtime_is_ignored() {
        let file = write_file("AT\nOK\n");
        let registry = TriggerRegistry::load(file.path()).unwrap();

        let earlier = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_modified(earlier)
            .unwrap();

        assert!(!registry.check_modified());
    }

    #[test]
    fn test_failed_stat_keeps_baseline() {
        let file = write_file("AT\nOK\n");
        let registry = TriggerRegistry::load(file.path()).unwrap();

        registry.record_modified(None);
        assert!(registry.lock_modified().is_some());

        let later = SystemTime::now() + Duration::from_secs(60);
        File::options()
            .write(true)
            .open(file.path())
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(registry.check_modified());
    }

    #[test]
    fn test_startup_without_file_leaves_triggers_off() {
        let state = RunState::new();
        let (registry, err) = TriggerRegistry::at_startup(None, &state);
        assert!(err.is_none());
        assert!(registry.source().is_none());
        assert!(!state.triggers_enabled());
    }

    #[test]
    fn test_startup_with_file_turns_triggers_on() {
        let file = write_file("AT\nOK\n");
        let state = RunState::new();
        let (registry, err) = TriggerRegistry::at_startup(Some(file.path()), &state);
        assert!(err.is_none());
        assert_eq!(registry.len(), 1);
        assert!(state.triggers_enabled());
    }

    #[test]
    fn test_startup_with_unreadable_file_disables_triggers() {
        let state = RunState::new();
        let (registry, err) =
            TriggerRegistry::at_startup(Some(Path::new("/nonexistent/ttc.txt")), &state);
        assert!(matches!(err, Some(TriggerFileError::Read { .. })));
        assert!(registry.is_empty());
        assert!(registry.source().is_none());
        assert!(!state.triggers_enabled());
        assert!(matches!(registry.reload(), Err(TriggerFileError::NoSource)));
    }

    #[test]
    fn test_check_without_source_is_false() {
        assert!(!TriggerRegistry::empty().check_modified());
    }
}

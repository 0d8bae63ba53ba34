//! Substring matching of device output against trigger rules.

use std::io;
use std::time::Duration;

use super::{TriggerRule, TriggerSet};
use crate::constants::RESPONSE_TERMINATOR;
use crate::device::SerialLink;

/// Whether `needle` occurs anywhere in `haystack`.
///
/// Literal and case-sensitive.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Scan `chunk` against every rule in order and answer each match.
///
/// A matching rule writes `\r`, its response paced by `pacing`, and a
/// closing `\r`, then flushes the device. Each rule fires at most once per
/// chunk. Returns the rules that fired.
pub fn match_and_respond<'a>(
    chunk: &[u8],
    rules: &'a TriggerSet,
    link: &dyn SerialLink,
    pacing: Duration,
) -> io::Result<Vec<&'a TriggerRule>> {
    let mut fired = Vec::new();

    for rule in rules.rules() {
        if !contains(chunk, &rule.trigger) {
            continue;
        }

        let mut framed = Vec::with_capacity(rule.response.len() + 2);
        framed.push(RESPONSE_TERMINATOR);
        framed.extend_from_slice(&rule.response);
        framed.push(RESPONSE_TERMINATOR);
        link.write_paced(&framed, pacing)?;

        if let Err(e) = link.flush_output() {
            log::warn!("Flush after trigger response failed: {e}");
        }

        log::info!(
            "Trigger fired: {:?} -> {:?}",
            rule.trigger_text(),
            rule.response_text()
        );
        fired.push(rule);
    }

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::memory::MemoryLink;

    #[test]
    fn test_contains_is_unanchored() {
        assert!(contains(b"xxAT+OKxx", b"AT"));
        assert!(contains(b"AT", b"AT"));
        assert!(!contains(b"A", b"AT"));
        assert!(!contains(b"anything", b""));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let rules = TriggerSet::parse(b"AT\nOK\n");
        let link = MemoryLink::new();
        let fired = match_and_respond(b"at\n", &rules, &link, Duration::ZERO).unwrap();
        assert!(fired.is_empty());
        assert!(link.written().is_empty());
    }

    #[test]
    fn test_substring_match_writes_framed_response() {
        let rules = TriggerSet::parse(b"AT\nOK\n");
        let link = MemoryLink::new();
        let fired = match_and_respond(b"...AT+OK...", &rules, &link, Duration::ZERO).unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(link.written(), b"\rOK\r");
        assert_eq!(link.flushes(), 1);
    }

    #[test]
    fn test_each_rule_fires_once_per_chunk() {
        let rules = TriggerSet::parse(b"AT\nOK\n");
        let link = MemoryLink::new();
        match_and_respond(b"AT AT AT", &rules, &link, Duration::ZERO).unwrap();
        assert_eq!(link.written(), b"\rOK\r");
    }

    #[test]
    fn test_duplicate_rules_fire_independently() {
        let rules = TriggerSet::parse(b"AT\nOK\nAT\nOK\n");
        let link = MemoryLink::new();
        let fired = match_and_respond(b"AT", &rules, &link, Duration::ZERO).unwrap();
        assert_eq!(fired.len(), 2);
        assert_eq!(link.written(), b"\rOK\r\rOK\r");
        assert_eq!(link.paced_writes(), 2);
    }

    #[test]
    fn test_rules_fire_in_file_order() {
        let rules = TriggerSet::parse(b"login:\nroot\nPassword:\nsecret\n");
        let link = MemoryLink::new();
        match_and_respond(b"Password: login:", &rules, &link, Duration::ZERO).unwrap();
        assert_eq!(link.written(), b"\rroot\r\rsecret\r");
    }
}

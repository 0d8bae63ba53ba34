//! Supported line rates.
//!
//! A fixed ascending table of symbol rates from 50 bps to 4 Mbps. Entries
//! are addressed by index; the index is what the command interpreter cycles
//! with the `U`/`D` keys.

/// Supported rates in bps, ascending.
pub const SPEEDS: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115_200,
    230_400, 460_800, 921_600, 1_000_000, 1_152_000, 1_500_000, 2_000_000, 2_500_000, 3_000_000,
    3_500_000, 4_000_000,
];

/// Index returned when the requested rate exceeds the table (115200 bps).
pub const DEFAULT_SPEED_INDEX: usize = 15;

/// Index of the transitional rate applied before the target rate (9600 bps).
pub const BASELINE_SPEED_INDEX: usize = 11;

/// Find the smallest supported rate >= `requested`.
///
/// Returns [`DEFAULT_SPEED_INDEX`] when `requested` is above the fastest entry.
pub fn find_speed(requested: u32) -> usize {
    SPEEDS
        .iter()
        .position(|&rate| requested <= rate)
        .unwrap_or(DEFAULT_SPEED_INDEX)
}

/// Rate in bps for `index`.
///
/// Out-of-range indices fall back to the default rate.
pub fn rate(index: usize) -> u32 {
    SPEEDS
        .get(index)
        .copied()
        .unwrap_or(SPEEDS[DEFAULT_SPEED_INDEX])
}

/// Next faster index, wrapping to 0 past the end.
pub fn next_index(index: usize) -> usize {
    if index + 1 >= SPEEDS.len() {
        0
    } else {
        index + 1
    }
}

/// Next slower index, wrapping to the last entry below 0.
pub fn prev_index(index: usize) -> usize {
    if index == 0 || index >= SPEEDS.len() {
        SPEEDS.len() - 1
    } else {
        index - 1
    }
}

use regex::Regex;

use crate::error::SyncError;

/// Parse a `--watch` value into seconds.
///
/// Accepts a bare number of seconds (`"120"`) or a number and a unit
/// (`"30 s"`, `"15 m"`, `"1 h"`; only the unit's first letter counts).
pub fn parse_watch(watch: &str) -> Result<u64, SyncError> {
    let re = Regex::new(r"^(\d+)(?:\s*([smhSMH])[A-Za-z]*)?$").expect("valid watch pattern");
    let caps = re
        .captures(watch.trim())
        .ok_or_else(|| SyncError::InvalidWatch(watch.to_string()))?;
    let num: u64 = caps[1].parse().map_err(|_| SyncError::InvalidWatch(watch.to_string()))?;
    let multi = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(u) if u == "m" => 60,
        Some(u) if u == "h" => 3600,
        _ => 1,
    };
    num.checked_mul(multi).ok_or_else(|| SyncError::InvalidWatch(watch.to_string()))
}

//! Duration strings used in warden.toml ("500ms", "10s", "5m", "4h").

use std::time::Duration;

/// Parse a duration string like "5s", "500ms", "1m", "12h".
///
/// A plain number is read as seconds. Values whose second count overflows
/// `u64` are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 3600)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn scaled(value: &str, unit_secs: u64) -> Option<Duration> {
    value
        .parse::<u64>()
        .ok()?
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
}

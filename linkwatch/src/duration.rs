//! Human-friendly durations for flags and log lines.

use std::time::Duration;

use anyhow::{bail, Result};

/// Suffix to seconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 0.001),
    ("s", 1.0),
    ("m", 60.0),
    ("h", 3600.0),
];

/// Parse duration strings like "1.5s", "500ms", "2m" or a bare number of
/// seconds ("30", "0.25").
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("Empty duration");
    }

    let (number, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, mult)| s.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((s, 1.0));

    let value: f64 = match number.trim().parse() {
        Ok(v) => v,
        Err(_) => bail!("Unknown duration format: {}", s),
    };
    seconds(value * multiplier)
}

/// Convert a float number of seconds, rejecting negative and non-finite values.
pub fn seconds(value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        bail!("Duration must be a non-negative number of seconds, got {}", value);
    }
    Ok(Duration::from_secs_f64(value))
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        "0ms".to_string()
    } else if millis < 1_000 {
        format!("{}ms", millis)
    } else if d.as_secs() < 120 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let secs = d.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

//! ID and time utilities for botqueue
//!
//! Provides request identifiers plus the millisecond clock and the
//! human-readable formatting used in requester messages.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Generate a unique request ID
///
/// Format: `req-{timestamp_ms}-{random_hex}`
/// Example: `req-1738300800123-a1b2`
pub fn generate_request_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("req-{}-{:04x}", timestamp, random)
}

/// Render a millisecond span as a coarse duration ("45 seconds", "3 minutes", "2 hours")
pub fn humanize_ms(ms: u64) -> String {
    let secs = ms / 1000;
    match secs {
        0..=59 => plural(secs.max(1), "second"),
        60..=5399 => plural(secs.div_ceil(60), "minute"),
        _ => plural(secs.div_ceil(3600), "hour"),
    }
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Format a millisecond Unix timestamp as UTC, or "unknown" if out of range
pub fn format_timestamp(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_request_id_format() {
        let id = generate_request_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_request_id_uniqueness() {
        let id1 = generate_request_id();
        let id2 = generate_request_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_humanize_seconds() {
        assert_eq!(humanize_ms(0), "1 second");
        assert_eq!(humanize_ms(1_000), "1 second");
        assert_eq!(humanize_ms(45_000), "45 seconds");
    }

    #[test]
    fn test_humanize_minutes_round_up() {
        assert_eq!(humanize_ms(60_000), "1 minute");
        assert_eq!(humanize_ms(61_000), "2 minutes");
        assert_eq!(humanize_ms(300_000), "5 minutes");
    }

    #[test]
    fn test_humanize_hours() {
        assert_eq!(humanize_ms(2 * 3_600_000), "2 hours");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }
}

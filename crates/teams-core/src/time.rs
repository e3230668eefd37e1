//! Timestamp helpers
//!
//! Bus rows carry second-precision UTC strings; filesystem artifacts carry
//! millisecond-precision strings and ms-epoch integers.

use chrono::Utc;

/// Second-precision UTC timestamp, e.g. `2026-03-01T12:00:00Z`.
pub fn utc_now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Millisecond-precision UTC timestamp, e.g. `2026-03-01T12:00:00.123Z`.
pub fn utc_now_iso_ms() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_precision_shape() {
        let ts = utc_now_iso();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-03-01T12:00:00Z".len());
        assert!(!ts.contains('.'));
    }

    #[test]
    fn test_ms_precision_shape() {
        let ts = utc_now_iso_ms();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.len(), "2026-03-01T12:00:00.123Z".len());
    }

    #[test]
    fn test_now_ms_nonzero() {
        assert!(now_ms() > 1_500_000_000_000);
    }
}

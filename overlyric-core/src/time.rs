//! Time and duration conversion utilities.
//!
//! This module provides safe conversion functions for durations,
//! avoiding truncation issues with explicit saturation behavior.

use std::time::Duration;

/// Extension trait for safe Duration conversions.
pub trait DurationExt {
    /// Convert duration to milliseconds as u64, saturating at `u64::MAX`.
    ///
    /// In practice, this is always safe because durations exceeding `u64::MAX`
    /// milliseconds would represent ~584 million years.
    fn as_millis_u64(&self) -> u64;
}

impl DurationExt for Duration {
    fn as_millis_u64(&self) -> u64 {
        u64::try_from(self.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Format a playback position as `MM:SS:mmm`.
///
/// Minutes are not wrapped at 60, so a 75 minute position renders as `75:00:000`.
#[must_use]
pub fn format_position(position_ms: u64) -> String {
    let minutes = position_ms / 60_000;
    let seconds = (position_ms / 1000) % 60;
    let millis = position_ms % 1000;
    format!("{minutes:02}:{seconds:02}:{millis:03}")
}

/// Current wall-clock time as milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_millis_u64() {
        let duration = Duration::from_millis(1234);
        assert_eq!(duration.as_millis_u64(), 1234);
    }

    #[test]
    fn test_format_position_zero() {
        assert_eq!(format_position(0), "00:00:000");
    }

    #[test]
    fn test_format_position_mixed() {
        // 2 minutes, 5 seconds, 42 ms
        assert_eq!(format_position(125_042), "02:05:042");
    }

    #[test]
    fn test_format_position_long_track() {
        assert_eq!(format_position(75 * 60_000), "75:00:000");
    }
}

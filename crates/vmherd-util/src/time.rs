//! Time utilities for vmherd
//!
//! Provides both monotonic time (for job fire times) and wall-clock time
//! (for logging and for the hypervisor's state-change timestamps).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `VMHERD_MOCK_TIME` environment variable can be set
//! to override the wall-clock time reported by [`now`]. Monotonic time is
//! never mocked this way; tests drive it through tokio's paused clock.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "VMHERD_MOCK_TIME";

/// Offset between mock time and real time, computed once per process.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .and_then(|naive| Local.from_local_datetime(&naive).single())
                {
                    Some(mock_dt) => {
                        let offset = mock_dt.signed_duration_since(chrono::Local::now());
                        tracing::info!(
                            mock_time = %mock_time_str,
                            offset_secs = offset.num_seconds(),
                            "Mock time enabled"
                        );
                        return Some(offset);
                    }
                    None => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Wall-clock time `after` from now, for labelling scheduled work.
pub fn wall_clock_after(after: Duration) -> DateTime<Local> {
    let base = now();
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|d| base.checked_add_signed(d))
        .unwrap_or(base)
}

/// Parse a hypervisor state-change timestamp.
///
/// VirtualBox reports `VMStateChangeTime` as an ISO-8601 local timestamp
/// with nanosecond precision and no offset, e.g. `2024-03-01T09:15:02.118000000`.
/// Offsets, when present, are accepted and normalised to UTC.
pub fn parse_state_change_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// A point in monotonic time for job scheduling.
///
/// Backed by the tokio clock so that timers and fire times agree, including
/// under a paused test clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicInstant(tokio::time::Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(tokio::time::Instant::now())
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    pub fn checked_add(&self, duration: Duration) -> Option<MonotonicInstant> {
        self.0.checked_add(duration).map(MonotonicInstant)
    }

    /// Returns duration until `self`, or zero if `self` is in the past
    pub fn saturating_duration_until(&self, from: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(from.0)
    }

    /// The underlying runtime instant, for `tokio::time::sleep_until`.
    pub fn into_tokio(self) -> tokio::time::Instant {
        self.0
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_virtualbox_timestamp() {
        let dt = parse_state_change_time("2024-03-01T09:15:02.118000000").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 9);
        assert_eq!(dt.second(), 2);
    }

    #[test]
    fn parses_rfc3339_timestamp() {
        let dt = parse_state_change_time("2024-03-01T09:15:02+02:00").unwrap();
        assert_eq!(dt.hour(), 7);
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_state_change_time("yesterday").is_none());
        assert!(parse_state_change_time("").is_none());
    }

    #[test]
    fn timestamps_order_chronologically() {
        let a = parse_state_change_time("2024-03-01T09:15:02.000000000").unwrap();
        let b = parse_state_change_time("2024-03-01T09:15:02.500000000").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn monotonic_arithmetic() {
        let start = MonotonicInstant::now();
        let later = start + Duration::from_secs(30);

        assert_eq!(later.duration_since(start), Duration::from_secs(30));
        assert_eq!(later.saturating_duration_until(start), Duration::from_secs(30));
        assert_eq!(start.saturating_duration_until(later), Duration::ZERO);
        assert!(later > start);
    }
}

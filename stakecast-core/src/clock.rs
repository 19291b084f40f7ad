//! Time source abstraction.
//!
//! Every operation reads "now" exactly once and passes that value through
//! all of its time comparisons, so replaying the same command log with the
//! same clock readings reproduces the same state on every peer.

use chrono::{DateTime, Utc};

/// Millisecond-resolution time source.
pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall-clock time via chrono.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Format an epoch-millisecond timestamp as an RFC 3339 string.
pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Milliseconds since the Unix epoch. The only time unit on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MilliTime(i64);

impl MilliTime {
    pub fn now() -> Self {
        MilliTime(Utc::now().timestamp_millis())
    }

    pub const fn from_millis(millis: i64) -> Self {
        MilliTime(millis)
    }

    pub const fn as_millis(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Forward distance from `earlier`, zero if `earlier` is later.
    pub fn duration_since(self, earlier: MilliTime) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl From<i64> for MilliTime {
    fn from(millis: i64) -> Self {
        MilliTime(millis)
    }
}

impl fmt::Display for MilliTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f UTC")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_as_utc() {
        let t = MilliTime::from_millis(1_500_000_000_123);
        assert_eq!(t.to_string(), "2017-07-14 02:40:00.123 UTC");
    }

    #[test]
    fn duration_since_saturates() {
        let a = MilliTime::from_millis(1000);
        let b = MilliTime::from_millis(4000);
        assert_eq!(b.duration_since(a), Duration::from_secs(3));
        assert_eq!(a.duration_since(b), Duration::ZERO);
    }

    #[test]
    fn now_is_positive() {
        assert!(MilliTime::now() > MilliTime::from_millis(0));
    }
}

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

/// Source of "now" for timestamps and expiration.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// One write instant in both forms stored by an upsert.
///
/// `display` has one-second resolution, so two writes within the same second
/// share it. Recency ordering relies on `score` only.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    /// `YYYY-MM-DD HH:MM:SS` in the configured offset, no suffix.
    pub display: String,
    /// Epoch seconds, used as the recency index score.
    pub score: f64,
}

impl Stamp {
    pub fn at(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            display: display_time(instant, offset),
            score: epoch_score(instant),
        }
    }
}

pub fn display_time(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Epoch seconds with microsecond precision.
pub fn epoch_score(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_micros() as f64 / 1_000_000.0
}

/// Fixed offset from whole hours, falling back to UTC when out of range.
pub fn offset_hours(hours: i32) -> FixedOffset {
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| {
            tracing::warn!("utc offset {hours}h out of range, using UTC");
            Utc.fix()
        })
}

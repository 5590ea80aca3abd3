use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall clock that never repeats or goes backwards within the process.
///
/// Each reading is at least one microsecond after the previous one, so
/// posts created by one process always sort in creation order.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let previous = self
            .last_micros
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(wall.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        let micros = wall.max(previous.saturating_add(1));
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }
}

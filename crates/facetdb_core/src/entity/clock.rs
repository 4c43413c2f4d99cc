//! Strictly monotonic wall clock for entity timestamps.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out UTC timestamps, each strictly later than the one before.
///
/// Readings follow the system clock at nanosecond resolution. When the
/// system clock stalls or steps backwards, the clock advances by one
/// nanosecond instead, so `updated_at` always moves forward on every save.
#[derive(Debug, Default)]
pub struct Clock {
    last_nanos: AtomicI64,
}

impl Clock {
    /// Creates a clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX - 1);
        let mut next = wall;
        // fetch_update only fails when the closure returns None
        let _ = self
            .last_nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                next = wall.max(last.saturating_add(1));
                Some(next)
            });
        Utc.timestamp_nanos(next)
    }

    /// Makes sure later readings come after `seen`.
    ///
    /// Called during recovery with timestamps read back from the journal.
    pub fn observe(&self, seen: DateTime<Utc>) {
        if let Some(nanos) = seen.timestamp_nanos_opt() {
            self.last_nanos.fetch_max(nanos, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn readings_strictly_increase() {
        let clock = Clock::new();
        let mut previous = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn observe_moves_clock_forward() {
        let clock = Clock::new();
        let future = Utc::now() + Duration::days(1);
        clock.observe(future);
        assert!(clock.now() > future);
    }

    #[test]
    fn strictly_increasing_across_threads() {
        use std::sync::Arc;
        use std::thread;

        let clock = Arc::new(Clock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&clock);
                thread::spawn(move || (0..500).map(|_| c.now()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}

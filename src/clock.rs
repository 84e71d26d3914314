//! Wall-clock access and periodic-tick primitives shared by the sentiment
//! scanner and fill-sync loops.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::time::{Interval, MissedTickBehavior};

/// Thin wrapper around `Utc::now()` so a fixed clock can be substituted in
/// tests without threading a generic through every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock;

impl Clock {
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wraps `tokio::time::interval` with `MissedTickBehavior::Delay` so a
/// stalled tick (e.g. the process was suspended) collapses to a single
/// catch-up tick instead of firing a burst.
pub fn every(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Caps a repeated action to at most once per `window`, independent of how
/// often `try_fire` itself is called. Used by the sentiment scanner to
/// collapse multiple ingest ticks into a single analysis pass.
pub struct Debouncer {
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_fired: Mutex::new(None) }
    }

    /// Returns `true` at most once per window. Always fires the first call.
    pub fn try_fire(&self) -> bool {
        let now = Instant::now();
        let mut guard = self.last_fired.lock().expect("debouncer mutex poisoned");
        match *guard {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                *guard = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debouncer_fires_once_then_blocks_within_window() {
        let d = Debouncer::new(Duration::from_secs(60));
        assert!(d.try_fire());
        assert!(!d.try_fire());
        assert!(!d.try_fire());
    }
}

use chrono::{DateTime, Local};
use futures::future::BoxFuture;
use std::sync::Mutex;
use std::time::Duration;

/// Source of wall-clock time and timed pauses for the pipeline.
///
/// Every pause in the triage flow (rate-limit waits, retry backoff, spacing
/// between model calls, delays between messages) goes through this trait so
/// tests can run the whole pipeline without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Real clock backed by the system time and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Virtual clock: `sleep` advances time instantly and records the pause.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: DateTime<Local>,
    slept: Vec<Duration>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        ManualClock {
            state: Mutex::new(ManualState {
                now: start,
                slept: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    /// Every pause requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.slept.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.slept.push(duration);
            state.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        }
        Box::pin(async {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_sleep_advances_time() {
        let start = Local.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        tokio_test::block_on(clock.sleep(Duration::from_secs(3)));
        tokio_test::block_on(clock.sleep(Duration::from_millis(500)));

        assert_eq!(clock.now() - start, chrono::Duration::milliseconds(3500));
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total_slept(), Duration::from_millis(3500));
    }
}

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// Extra pause added on top of the computed window wait.
const WINDOW_BUFFER: Duration = Duration::from_millis(100);

/// Share of the daily budget after which non-essential work is skipped.
const SOFT_EXHAUSTION_PERCENT: f64 = 80.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("daily model quota exhausted ({used}/{limit})")]
pub struct QuotaExhausted {
    pub used: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageStats {
    pub current_requests: usize,
    pub max_requests: usize,
    pub daily_usage: u32,
    pub daily_limit: u32,
    pub time_until_slot: Duration,
}

/// Per-minute and per-day budget for remote model calls.
///
/// The governor keeps the timestamps of recent calls in a rolling window and
/// a counter for the current calendar day. Failed calls are recorded like
/// successful ones so a provider-side block is not hammered.
pub struct RateGovernor {
    clock: Arc<dyn Clock>,
    window: Duration,
    max_requests: usize,
    daily_limit: u32,
    requests: VecDeque<DateTime<Local>>,
    daily_usage: u32,
    last_reset: NaiveDate,
}

impl RateGovernor {
    pub fn new(clock: Arc<dyn Clock>, max_requests: usize, window: Duration, daily_limit: u32) -> Self {
        let last_reset = clock.now().date_naive();
        RateGovernor {
            clock,
            window,
            max_requests: max_requests.max(1),
            daily_limit,
            requests: VecDeque::new(),
            daily_usage: 0,
            last_reset,
        }
    }

    pub fn per_minute(clock: Arc<dyn Clock>, max_per_minute: usize, daily_limit: u32) -> Self {
        Self::new(clock, max_per_minute, Duration::from_secs(60), daily_limit)
    }

    /// Apply new limits (after a settings refresh) without losing counters.
    pub fn set_limits(&mut self, max_per_minute: usize, daily_limit: u32) {
        self.max_requests = max_per_minute.max(1);
        self.daily_limit = daily_limit;
    }

    pub fn can_proceed(&mut self) -> bool {
        self.reset_daily_if_needed();
        self.prune();

        if self.daily_usage >= self.daily_limit {
            warn!("⚠️  Daily API limit reached ({}). Skipping request.", self.daily_limit);
            return false;
        }

        self.requests.len() < self.max_requests
    }

    /// Suspend until a window slot is free.
    ///
    /// Waiting cannot recover the daily budget, so an exhausted day is
    /// reported to the caller instead.
    pub async fn wait_if_needed(&mut self) -> Result<(), QuotaExhausted> {
        self.reset_daily_if_needed();

        if self.daily_usage >= self.daily_limit {
            warn!("⚠️  Daily API limit reached ({}).", self.daily_limit);
            return Err(QuotaExhausted {
                used: self.daily_usage,
                limit: self.daily_limit,
            });
        }

        let wait = self.time_until_next_slot();
        if !wait.is_zero() {
            info!("⏳ Rate limit hit. Waiting {}s...", wait.as_secs_f64().ceil() as u64);
            self.clock.sleep(wait + WINDOW_BUFFER).await;
            self.prune();
        }

        Ok(())
    }

    /// Record one remote call; failures still consume quota.
    pub fn record(&mut self, success: bool) {
        self.reset_daily_if_needed();
        self.requests.push_back(self.clock.now());
        self.daily_usage += 1;

        if success {
            debug!("✅ API call successful. Daily usage: {}/{}", self.daily_usage, self.daily_limit);
        } else {
            warn!("❌ API call failed. Daily usage: {}/{}", self.daily_usage, self.daily_limit);
        }
    }

    /// True once more than 80% of the daily budget is consumed.
    pub fn should_skip_non_essential(&mut self) -> bool {
        self.reset_daily_if_needed();

        if self.daily_limit == 0 {
            return true;
        }

        let percentage = f64::from(self.daily_usage) / f64::from(self.daily_limit) * 100.0;
        if percentage > SOFT_EXHAUSTION_PERCENT {
            warn!("⚠️  Daily quota at {:.1}% - skipping non-essential analysis", percentage);
            return true;
        }

        false
    }

    pub fn usage(&mut self) -> UsageStats {
        self.reset_daily_if_needed();
        self.prune();

        UsageStats {
            current_requests: self.requests.len(),
            max_requests: self.max_requests,
            daily_usage: self.daily_usage,
            daily_limit: self.daily_limit,
            time_until_slot: self.time_until_next_slot(),
        }
    }

    fn time_until_next_slot(&mut self) -> Duration {
        self.prune();

        if self.requests.len() < self.max_requests {
            return Duration::ZERO;
        }

        let Some(oldest) = self.requests.front() else {
            return Duration::ZERO;
        };

        let elapsed = (self.clock.now() - *oldest).to_std().unwrap_or(Duration::ZERO);
        self.window.saturating_sub(elapsed)
    }

    fn prune(&mut self) {
        let now = self.clock.now();
        while let Some(oldest) = self.requests.front() {
            let age = (now - *oldest).to_std().unwrap_or(Duration::ZERO);
            if age >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn reset_daily_if_needed(&mut self) {
        let today = self.clock.now().date_naive();
        if today != self.last_reset {
            self.daily_usage = 0;
            self.last_reset = today;
            info!("🔄 Daily API usage counter reset for {}", today);
        }
    }
}

//! Comment throttling against rolling hour/day windows.
//!
//! Every admission waits a fixed delay first, then checks both windows.
//! When a window is full the limiter sleeps for the cooldown and starts over,
//! so callers are delayed rather than rejected.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Length of the hourly window
pub const HOUR_WINDOW: Duration = Duration::from_secs(60 * 60);
/// Length of the daily window
pub const DAY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Rate limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admitted comments in any trailing hour
    pub max_per_hour: usize,
    /// Maximum admitted comments in any trailing day
    pub max_per_day: usize,
    /// Delay imposed before every admission check
    pub initial_delay: Duration,
    /// Wait between admission attempts while a window is full
    pub cooldown: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_hour: 8,
            max_per_day: 50,
            initial_delay: Duration::from_secs(15),
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Two ordered timestamp sequences of admitted comments
#[derive(Debug, Default, Clone)]
pub struct RateWindow {
    hour: VecDeque<Instant>,
    day: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant) {
        prune_older_than(&mut self.hour, now, HOUR_WINDOW);
        prune_older_than(&mut self.day, now, DAY_WINDOW);
    }

    fn push(&mut self, at: Instant) {
        self.hour.push_back(at);
        self.day.push_back(at);
    }

    fn pop_latest(&mut self) {
        self.hour.pop_back();
        self.day.pop_back();
    }
}

fn prune_older_than(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while window
        .front()
        .is_some_and(|at| now.saturating_duration_since(*at) >= span)
    {
        window.pop_front();
    }
}

/// Throttles how often any comment may be posted
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: RateWindow,
}

impl RateLimiter {
    /// Create a limiter with an empty history.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: RateWindow::default(),
        }
    }

    /// Wait until a comment may be posted, then record the posting intent.
    ///
    /// Never fails: while either window is at its ceiling the call keeps
    /// cooling down and retrying.
    pub async fn admit(&mut self) {
        loop {
            debug!(
                delay_secs = self.config.initial_delay.as_secs(),
                "Waiting before comment"
            );
            sleep(self.config.initial_delay).await;

            let now = Instant::now();
            self.window.prune(now);

            let hour = self.window.hour.len();
            let day = self.window.day.len();
            if hour >= self.config.max_per_hour || day >= self.config.max_per_day {
                warn!(
                    hour,
                    day,
                    max_per_hour = self.config.max_per_hour,
                    max_per_day = self.config.max_per_day,
                    cooldown_secs = self.config.cooldown.as_secs(),
                    "Rate limit reached, cooling down"
                );
                sleep(self.config.cooldown).await;
                continue;
            }

            self.window.push(now);
            info!(
                "Allowed to comment. Hour: {}/{}, Day: {}/{}",
                hour + 1,
                self.config.max_per_hour,
                day + 1,
                self.config.max_per_day
            );
            return;
        }
    }

    /// Undo the most recent admission after a failed post.
    ///
    /// No-op on an empty history.
    pub fn rollback(&mut self) {
        self.window.pop_latest();
        debug!(
            hour = self.window.hour.len(),
            day = self.window.day.len(),
            "Rolled back last admission"
        );
    }

    /// Admissions currently counted in the hourly window (not pruned).
    #[must_use]
    pub fn hour_len(&self) -> usize {
        self.window.hour.len()
    }

    /// Admissions currently counted in the daily window (not pruned).
    #[must_use]
    pub fn day_len(&self) -> usize {
        self.window.day.len()
    }

    /// Configured limits.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// bot/src/timing.rs
//! Wall-clock access for scheduling decisions.
//!
//! Every schedule is expressed as a `DateTime<Utc>`; waiting for one is a
//! tokio sleep for the remaining duration. `MockClock` derives its wall time
//! from the tokio clock, so tests running with paused time see both advance
//! together.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed starting wall time that advances with the tokio clock.
#[derive(Debug, Clone, Copy)]
pub struct MockClock {
    wall_anchor: DateTime<Utc>,
    instant_anchor: Instant,
}

impl MockClock {
    pub fn starting_at(wall_anchor: DateTime<Utc>) -> Self {
        Self {
            wall_anchor,
            instant_anchor: Instant::now(),
        }
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.instant_anchor);
        self.wall_anchor + ChronoDuration::from_std(elapsed).unwrap_or_else(|_| ChronoDuration::zero())
    }
}

/// Remaining time until `at`, zero if it already passed.
pub fn until(clock: &dyn Clock, at: DateTime<Utc>) -> Duration {
    (at - clock.now()).to_std().unwrap_or(Duration::ZERO)
}

/// Sleeps until `at`, or forever when nothing is armed.
pub async fn sleep_until(clock: &dyn Clock, at: Option<DateTime<Utc>>) {
    match at {
        Some(at) => tokio::time::sleep(until(clock, at)).await,
        None => std::future::pending::<()>().await,
    }
}

pub fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::max_value())
}

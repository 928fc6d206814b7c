// bot/src/scheduler.rs
//! The single logical timer behind each agent.
//!
//! ```text
//! Idle -> Armed -> Fired -> Armed | Cooldown | Terminal
//!                  Cooldown -> (re-poll) -> Armed | Cooldown
//! ```
//!
//! The scheduler never sleeps itself; it records the one outstanding deadline
//! and the event loop waits for it. Arming always cancels what was there.

use crate::error::{BotError, BotResult};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ethers::types::U256;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed { at: DateTime<Utc> },
    Fired { expiry: DateTime<Utc> },
    Cooldown { until: DateTime<Utc> },
    Terminal,
}

/// What a timer expiry means for the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// Submit the pending transaction. `expiry` is the armed time, not now.
    Submit { expiry: DateTime<Utc> },
    /// Cooldown elapsed: read the on-chain schedule again.
    Repoll,
}

/// Result of feeding an on-chain compounding time to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainDecision {
    Armed(DateTime<Utc>),
    Cooldown(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    state: SchedulerState,
    offset: Duration,
    cooldown: Duration,
    last_compounding_time: Option<U256>,
}

impl Scheduler {
    pub fn new(offset: Duration, cooldown: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            offset,
            cooldown,
            last_compounding_time: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// The outstanding deadline, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            SchedulerState::Armed { at } => Some(at),
            SchedulerState::Cooldown { until } => Some(until),
            _ => None,
        }
    }

    /// Drops any outstanding deadline. Safe to call in any state.
    pub fn cancel(&mut self) {
        if self.deadline().is_some() {
            debug!("Cancelling outstanding timer.");
        }
        if self.state != SchedulerState::Terminal {
            self.state = SchedulerState::Idle;
        }
    }

    fn arm(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.cancel();
        self.state = SchedulerState::Armed { at };
        at
    }

    /// First firing of a fixed schedule: `start_time + offset`, which must not
    /// already be in the past.
    pub fn arm_fixed_start(&mut self, start_time: DateTime<Utc>, now: DateTime<Utc>) -> BotResult<DateTime<Utc>> {
        let target = shifted(start_time, self.offset)?;
        if target < now {
            return Err(BotError::ScheduleInPast { target, now });
        }
        Ok(self.arm(target))
    }

    /// Re-arms `interval` after the previous expiry (not after now), so
    /// repeated firings do not accumulate drift.
    pub fn arm_after_previous(&mut self, interval: Duration) -> BotResult<Option<DateTime<Utc>>> {
        match self.state {
            SchedulerState::Fired { expiry } => {
                let at = shifted(expiry, interval)?;
                Ok(Some(self.arm(at)))
            }
            _ => Ok(None),
        }
    }

    /// Feeds the contract's next compounding time (unix seconds).
    ///
    /// A new value arms for `time + offset`. An unchanged value means the
    /// on-chain state has not advanced yet, so we cool down and poll again.
    pub fn observe_compounding_time(&mut self, next: U256, now: DateTime<Utc>) -> BotResult<OnChainDecision> {
        if self.last_compounding_time == Some(next) {
            return self.arm_cooldown(now).map(OnChainDecision::Cooldown);
        }
        if next > U256::from(i64::MAX as u64) {
            return Err(BotError::semantic("nearestCompoundingTime", format!("time {} out of range", next)));
        }
        let base = Utc
            .timestamp_opt(next.as_u64() as i64, 0)
            .single()
            .ok_or_else(|| BotError::semantic("nearestCompoundingTime", format!("time {} out of range", next)))?;
        let at = base
            .checked_add_signed(self.offset)
            .ok_or_else(|| BotError::semantic("nearestCompoundingTime", format!("time {} plus offset out of range", next)))?;
        self.last_compounding_time = Some(next);
        Ok(OnChainDecision::Armed(self.arm(at)))
    }

    /// Arms the short cooldown poll from now.
    pub fn arm_cooldown(&mut self, now: DateTime<Utc>) -> BotResult<DateTime<Utc>> {
        let until = shifted(now, self.cooldown)?;
        self.cancel();
        self.state = SchedulerState::Cooldown { until };
        Ok(until)
    }

    /// Consumes the outstanding deadline.
    pub fn fire(&mut self) -> Option<Firing> {
        match self.state {
            SchedulerState::Armed { at } => {
                self.state = SchedulerState::Fired { expiry: at };
                Some(Firing::Submit { expiry: at })
            }
            SchedulerState::Cooldown { .. } => {
                self.state = SchedulerState::Idle;
                Some(Firing::Repoll)
            }
            _ => None,
        }
    }

    /// No further firings.
    pub fn finish(&mut self) {
        self.state = SchedulerState::Terminal;
    }

    pub fn is_terminal(&self) -> bool {
        self.state == SchedulerState::Terminal
    }
}

/// `at + by`, or a config error when the sum leaves the calendar.
pub fn shifted(at: DateTime<Utc>, by: Duration) -> BotResult<DateTime<Utc>> {
    at.checked_add_signed(by).ok_or_else(|| {
        BotError::Config(format!("{} shifted by {}ms is out of range", at, by.num_milliseconds()))
    })
}

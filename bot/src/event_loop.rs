// bot/src/event_loop.rs
//! Per-bot submission loop.
//!
//! One agent owns one main timer (the scheduler's deadline) and at most one
//! deferred reconciliation. Handlers run to completion before the next timer
//! is awaited, so scheduling decisions never race each other.

use crate::encoding::{FunctionCall, TargetFunction};
use crate::error::{BotError, BotResult};
use crate::ledger::Ledger;
use crate::reconcile::ReconciliationScanner;
use crate::rpc::{CallRequest, ChainClient};
use crate::scheduler::{shifted, Firing, OnChainDecision, Scheduler};
use crate::signer::TxSigner;
use crate::timing::{sleep_until, Clock};
use crate::transaction::{PendingTransaction, TransactionBuilder};
use crate::utils::{format_units, NATIVE_DECIMALS};
use chrono::{DateTime, Duration, Utc};
use ethers::types::{TxHash, U256};
use std::{fmt, str::FromStr, sync::Arc};
use tracing::{debug, error, info, instrument, warn};

pub const MODE_APPROVE_10X1MIN: &str = "approve10x1min";
pub const MODE_COMPOUND_10X1MIN: &str = "compound10x1min";
pub const MODE_COMPOUND: &str = "compound";

/// Operating mode, fixed for the lifetime of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fire `count` times, `interval` apart, starting at `start_time + offset`.
    FixedCountInterval {
        function: TargetFunction,
        count: u32,
        interval: Duration,
        offset: Duration,
    },
    /// Fire at the contract's next compounding time plus `offset`, forever.
    CompoundOnChainSchedule { offset: Duration },
}

impl Mode {
    pub fn from_name(name: &str, count: u32, interval: Duration, offset: Duration) -> BotResult<Self> {
        match name {
            MODE_APPROVE_10X1MIN => Ok(Mode::FixedCountInterval {
                function: TargetFunction::Approve,
                count,
                interval,
                offset,
            }),
            MODE_COMPOUND_10X1MIN => Ok(Mode::FixedCountInterval {
                function: TargetFunction::Compound,
                count,
                interval,
                offset,
            }),
            MODE_COMPOUND => Ok(Mode::CompoundOnChainSchedule { offset }),
            other => Err(BotError::Config(format!("unknown mode '{}'", other))),
        }
    }

    pub fn target(&self) -> TargetFunction {
        match self {
            Mode::FixedCountInterval { function, .. } => *function,
            Mode::CompoundOnChainSchedule { .. } => TargetFunction::Compound,
        }
    }

    /// Delay applied after the scheduled time before firing.
    pub fn offset(&self) -> Duration {
        match self {
            Mode::FixedCountInterval { offset, .. } | Mode::CompoundOnChainSchedule { offset } => *offset,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::FixedCountInterval { function, count, interval, offset } => write!(
                f,
                "{} x{} every {}s, offset {}ms",
                function,
                count,
                interval.num_seconds(),
                offset.num_milliseconds()
            ),
            Mode::CompoundOnChainSchedule { offset } => {
                write!(f, "compound on chain schedule, offset {}ms", offset.num_milliseconds())
            }
        }
    }
}

/// Parses a mode name with default count and interval and no offset.
impl FromStr for Mode {
    type Err = BotError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::from_name(
            s,
            crate::config::DEFAULT_FIRE_COUNT,
            Duration::seconds(crate::config::DEFAULT_INTERVAL_SECS as i64),
            Duration::zero(),
        )
    }
}

/// Per-agent timing knobs.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub bot_id: u32,
    pub name: String,
    /// Used by fixed-count modes only.
    pub start_time: DateTime<Utc>,
    pub cooldown: Duration,
    pub reconcile_delay: Duration,
    pub scan_radius: u64,
}

/// What an agent did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub submitted: u32,
    pub failed: u32,
    pub reconciled: usize,
}

pub struct Agent<C: ?Sized, S> {
    settings: AgentSettings,
    mode: Mode,
    call: FunctionCall,
    client: Arc<C>,
    builder: TransactionBuilder<S>,
    scheduler: Scheduler,
    scanner: ReconciliationScanner,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    remaining: u32,
    pending: Option<PendingTransaction>,
    reconcile_at: Option<(DateTime<Utc>, TxHash)>,
    report: AgentReport,
}

impl<C, S> Agent<C, S>
where
    C: ChainClient + ?Sized,
    S: TxSigner,
{
    pub fn new(
        settings: AgentSettings,
        mode: Mode,
        client: Arc<C>,
        builder: TransactionBuilder<S>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let call = match mode.target() {
            // Zero allowance for the bot's own wallet.
            TargetFunction::Approve => FunctionCall::Approve {
                spender: builder.account().address,
                amount: U256::zero(),
            },
            TargetFunction::Compound => FunctionCall::Compound,
        };
        let remaining = match mode {
            Mode::FixedCountInterval { count, .. } => count,
            Mode::CompoundOnChainSchedule { .. } => 0,
        };
        Self {
            scheduler: Scheduler::new(mode.offset(), settings.cooldown),
            scanner: ReconciliationScanner::new(settings.bot_id, mode.offset().num_milliseconds(), settings.scan_radius),
            settings,
            mode,
            call,
            client,
            builder,
            ledger,
            clock,
            remaining,
            pending: None,
            reconcile_at: None,
            report: AgentReport::default(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn pending(&self) -> Option<&PendingTransaction> {
        self.pending.as_ref()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn report(&self) -> AgentReport {
        self.report
    }

    /// Deadline of the outstanding reconciliation, if any.
    pub fn reconcile_deadline(&self) -> Option<DateTime<Utc>> {
        self.reconcile_at.map(|(at, _)| at)
    }

    /// Starts the agent and drives it until no timer is left.
    #[instrument(skip_all, fields(bot = %self.settings.name, id = self.settings.bot_id))]
    pub async fn run(mut self) -> BotResult<AgentReport> {
        self.start().await?;
        while self.tick().await? {}
        info!(report = ?self.report, "Agent finished.");
        Ok(self.report)
    }

    /// Logs the balance, fixes the starting nonce, prepares the first
    /// transaction and arms the first firing.
    pub async fn start(&mut self) -> BotResult<()> {
        info!(mode = %self.mode, wallet = %self.builder.account().address, contract = %self.builder.account().contract, "Starting agent.");
        self.log_balance().await;
        self.builder.account().nonce.initialize(self.client.as_ref()).await?;

        match self.mode {
            Mode::FixedCountInterval { .. } => {
                if self.remaining == 0 {
                    info!("Nothing to fire.");
                    self.scheduler.finish();
                    return Ok(());
                }
                let at = self.scheduler.arm_fixed_start(self.settings.start_time, self.clock.now())?;
                info!(%at, "First firing scheduled.");
                self.prepare_next().await?;
            }
            Mode::CompoundOnChainSchedule { .. } => {
                self.prepare_next().await?;
                self.poll_schedule().await?;
            }
        }
        Ok(())
    }

    /// Waits for the earliest timer and handles it. Returns `false` once
    /// nothing is armed.
    pub async fn tick(&mut self) -> BotResult<bool> {
        let main_at = self.scheduler.deadline();
        let reconcile_at = self.reconcile_deadline();
        if main_at.is_none() && reconcile_at.is_none() {
            return Ok(false);
        }
        let clock = self.clock.clone();
        tokio::select! {
            biased;
            _ = sleep_until(clock.as_ref(), main_at) => self.on_main_timer().await?,
            _ = sleep_until(clock.as_ref(), reconcile_at) => self.on_reconcile_timer().await?,
        }
        Ok(true)
    }

    async fn log_balance(&self) {
        let address = self.builder.account().address;
        match self.client.balance(address).await {
            Ok(Some(balance)) => {
                let shown = format_units(balance, NATIVE_DECIMALS).unwrap_or_else(|_| balance.to_string());
                info!(%address, balance = %shown, "Wallet balance.");
            }
            Ok(None) => warn!(%address, "Wallet balance unknown."),
            Err(e) => warn!(%address, error = %e, "Balance query failed."),
        }
    }

    async fn on_main_timer(&mut self) -> BotResult<()> {
        match self.scheduler.fire() {
            Some(Firing::Submit { expiry }) => self.on_submit(expiry).await,
            Some(Firing::Repoll) => {
                debug!("Cooldown over, polling compounding time again.");
                self.poll_schedule().await
            }
            None => Ok(()),
        }
    }

    async fn on_submit(&mut self, expiry: DateTime<Utc>) -> BotResult<()> {
        let hash = match self.pending.take() {
            Some(pending) => self.submit(pending, expiry).await?,
            None => {
                warn!(%expiry, "No transaction prepared for this firing, skipping.");
                self.report.failed += 1;
                None
            }
        };

        match self.mode {
            Mode::FixedCountInterval { interval, .. } => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    info!(submitted = self.report.submitted, "All firings done.");
                    self.scheduler.finish();
                    return Ok(());
                }
                self.prepare_next().await?;
                if let Some(at) = self.scheduler.arm_after_previous(interval)? {
                    info!(%at, remaining = self.remaining, "Next firing scheduled.");
                }
            }
            Mode::CompoundOnChainSchedule { .. } => {
                if let Some(hash) = hash {
                    let at = shifted(self.clock.now(), self.settings.reconcile_delay)?;
                    if let Some((_, previous)) = self.reconcile_at.replace((at, hash)) {
                        warn!(?previous, "Outstanding reconciliation replaced.");
                    }
                    debug!(%at, ?hash, "Reconciliation scheduled.");
                }
                self.prepare_next().await?;
                self.poll_schedule().await?;
            }
        }
        Ok(())
    }

    /// Sends one prepared payload. Recoverable failures are logged and yield
    /// `None`; the payload is never resent.
    async fn submit(&mut self, pending: PendingTransaction, expiry: DateTime<Utc>) -> BotResult<Option<TxHash>> {
        let lateness = self.clock.now() - expiry;
        info!(nonce = %pending.nonce, target = %pending.target, late_ms = lateness.num_milliseconds(), "Submitting transaction.");
        match self.client.send_raw_transaction(&pending.raw).await {
            Ok(hash) => {
                self.report.submitted += 1;
                if hash != pending.hash {
                    warn!(expected = ?pending.hash, returned = ?hash, "Node returned a different transaction hash.");
                }
                info!(?hash, nonce = %pending.nonce, "Transaction submitted.");
                Ok(Some(hash))
            }
            Err(e) if !e.is_fatal() => {
                self.report.failed += 1;
                error!(error = %e, nonce = %pending.nonce, "Submission failed, cycle skipped.");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn prepare_next(&mut self) -> BotResult<()> {
        match self.builder.prepare(self.client.as_ref(), &self.call).await {
            Ok(pending) => {
                self.pending = Some(pending);
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "Preparation failed, next firing has nothing to send.");
                self.pending = None;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Reads `nearestCompoundingTime` and arms for it, or cools down when the
    /// value has not moved or could not be read.
    async fn poll_schedule(&mut self) -> BotResult<()> {
        let encoder = self.builder.encoder();
        let request = CallRequest {
            from: self.builder.account().address,
            to: self.builder.account().contract,
            data: encoder.encode(&FunctionCall::NearestCompoundingTime)?,
        };
        let next = match self.client.call(&request).await {
            Ok(output) => encoder
                .decode_compounding_time(&output)
                .map_err(|e| BotError::semantic("eth_call", e)),
            Err(e) => Err(e),
        };
        let now = self.clock.now();

        let decision = match next {
            Ok(next) => {
                debug!(%next, "Next compounding time read.");
                self.scheduler.observe_compounding_time(next, now)
            }
            Err(e) => Err(e),
        };
        match decision {
            Ok(OnChainDecision::Armed(at)) => info!(%at, "Compound scheduled."),
            Ok(OnChainDecision::Cooldown(until)) => {
                info!(%until, "Compounding time unchanged, cooling down.")
            }
            Err(e) if !e.is_fatal() => {
                let until = self.scheduler.arm_cooldown(now)?;
                warn!(error = %e, %until, "Compounding time unavailable, cooling down.");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn on_reconcile_timer(&mut self) -> BotResult<()> {
        let hash = match self.reconcile_at.take() {
            Some((_, hash)) => hash,
            None => return Ok(()),
        };
        match self
            .scanner
            .scan_and_store(self.client.as_ref(), self.ledger.as_ref(), hash)
            .await
        {
            Ok(count) => {
                info!(?hash, records = count, "Reconciliation stored.");
                self.report.reconciled += count;
                Ok(())
            }
            Err(e) if !e.is_fatal() => {
                warn!(?hash, error = %e, "Reconciliation failed.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_names() {
        let offset = Duration::milliseconds(1500);
        let mode = Mode::from_name("approve10x1min", 10, Duration::minutes(1), offset).unwrap();
        assert_eq!(
            mode,
            Mode::FixedCountInterval {
                function: TargetFunction::Approve,
                count: 10,
                interval: Duration::minutes(1),
                offset
            }
        );
        assert_eq!(mode.target(), TargetFunction::Approve);
        assert_eq!(mode.offset(), offset);
        assert_eq!(
            Mode::from_name("compound", 10, Duration::minutes(1), offset).unwrap(),
            Mode::CompoundOnChainSchedule { offset }
        );
        assert_eq!("compound10x1min".parse::<Mode>().unwrap().target(), TargetFunction::Compound);
        assert_eq!(
            "compound".parse::<Mode>().unwrap(),
            Mode::CompoundOnChainSchedule { offset: Duration::zero() }
        );
        assert!(matches!("compound5x".parse::<Mode>(), Err(BotError::Config(_))));
    }
}

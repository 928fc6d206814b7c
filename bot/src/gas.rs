// bot/src/gas.rs
// Gas price / gas limit tracking for the next prepared transaction.

use crate::error::BotError;
use crate::rpc::{CallRequest, ChainClient};
use ethers::types::U256;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, instrument, warn};

pub const URGENT_GAS_PRICE_MULTIPLIER: u64 = 10;
pub const URGENT_GAS_LIMIT_MULTIPLIER: u64 = 2;

/// How fetched gas values are turned into the values we sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasPolicy {
    /// Configured price/limit, never queried.
    Fixed,
    /// Node values as-is.
    #[default]
    Conservative,
    /// Must land fast: 10x price, 2x limit.
    Urgent,
}

impl GasPolicy {
    pub fn multipliers(&self) -> (u64, u64) {
        match self {
            GasPolicy::Fixed | GasPolicy::Conservative => (1, 1),
            GasPolicy::Urgent => (URGENT_GAS_PRICE_MULTIPLIER, URGENT_GAS_LIMIT_MULTIPLIER),
        }
    }
}

impl FromStr for GasPolicy {
    type Err = BotError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(GasPolicy::Fixed),
            "conservative" => Ok(GasPolicy::Conservative),
            "urgent" | "fast" => Ok(GasPolicy::Urgent),
            _ => Err(BotError::Config(format!("Unknown gas policy: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasInfo {
    pub gas_price: U256,
    pub gas_limit: U256,
}

/// Last known gas values plus the policy applied on refresh.
#[derive(Debug, Clone)]
pub struct GasTracker {
    policy: GasPolicy,
    current: GasInfo,
}

impl GasTracker {
    /// Starts from the configured values; they stay the fallback until a refresh succeeds.
    pub fn new(policy: GasPolicy, gas_price: U256, gas_limit: U256) -> Self {
        Self {
            policy,
            current: GasInfo { gas_price, gas_limit },
        }
    }

    pub fn policy(&self) -> GasPolicy {
        self.policy
    }

    pub fn current(&self) -> GasInfo {
        self.current
    }

    /// Refreshes price and limit from the node for `call`.
    ///
    /// A failed read keeps the previous value for that half; estimating a call
    /// that would revert right now (compound before its time) is expected.
    #[instrument(skip_all, level = "debug", fields(policy = ?self.policy))]
    pub async fn refresh<C: ChainClient + ?Sized>(&mut self, client: &C, call: &CallRequest) -> GasInfo {
        if self.policy == GasPolicy::Fixed {
            return self.current;
        }
        let (price_mult, limit_mult) = self.policy.multipliers();

        match client.gas_price().await {
            Ok(price) => self.current.gas_price = price.saturating_mul(U256::from(price_mult)),
            Err(e) => warn!(error = %e, fallback = %self.current.gas_price, "Gas price fetch failed, keeping last value."),
        }
        match client.estimate_gas(call).await {
            Ok(limit) => self.current.gas_limit = limit.saturating_mul(U256::from(limit_mult)),
            Err(e) => warn!(error = %e, fallback = %self.current.gas_limit, "Gas estimation failed, keeping last value."),
        }

        debug!(gas_price = %self.current.gas_price, gas_limit = %self.current.gas_limit, "Gas refreshed.");
        self.current
    }
}

// bot/src/config.rs

use crate::error::{BotError, BotResult};
use crate::event_loop::{AgentSettings, Mode};
use crate::gas::{GasPolicy, GasTracker};
use crate::reconcile::DEFAULT_SCAN_RADIUS;
use crate::signer::{wallet_from_keystore, wallet_from_secret, TxSigner};
use chrono::{DateTime, Duration, TimeZone, Utc};
use ethers::{signers::LocalWallet, types::{Address, U256}};
use serde::Deserialize;
use serde_json::Value;
use std::{env, fmt, fs, path::Path};
use tracing::{debug, info};

// --- Defaults ---
pub const DEFAULT_FIRE_COUNT: u32 = 10;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;
pub const DEFAULT_RECONCILE_DELAY_SECS: u64 = 30;

// --- Bounds ---
pub const MAX_DELTA_MSEC: i64 = 365 * 24 * 3_600 * 1_000;
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3_600;
pub const MAX_WAIT_SECS: u64 = 24 * 3_600;

pub const KEYSTORE_ENV: &str = "BOT_KEYSTORE";
pub const KEYSTORE_PASSWORD_ENV: &str = "BOT_KEYSTORE_PASSWORD";

/// Hex private key. Never printed.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// One bot entry of the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub id: u32,
    pub name: String,
    pub mode: String,
    pub url: String,
    pub chain_id: u64,
    pub contract: Address,
    pub wallet: Address,
    pub secret: Secret,
    pub gas_limit: u64,
    pub gas_price: u64,
    /// Unix seconds.
    pub start_time: i64,
    pub delta_msec: i64,

    // Optional tuning
    #[serde(default)]
    pub gas_policy: GasPolicy,
    #[serde(default = "default_fire_count")]
    pub fire_count: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_reconcile_delay_secs")]
    pub reconcile_delay_secs: u64,
    #[serde(default = "default_scan_radius")]
    pub scan_radius: u64,
}

fn default_fire_count() -> u32 {
    DEFAULT_FIRE_COUNT
}
fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL_SECS
}
fn default_cooldown_secs() -> u64 {
    DEFAULT_COOLDOWN_SECS
}
fn default_reconcile_delay_secs() -> u64 {
    DEFAULT_RECONCILE_DELAY_SECS
}
fn default_scan_radius() -> u64 {
    DEFAULT_SCAN_RADIUS
}

impl BotConfig {
    fn bounded_secs(&self, field: &str, secs: u64, max: u64) -> BotResult<Duration> {
        if secs > max {
            return Err(BotError::Config(format!(
                "bot #{}: '{}' is {}, at most {} allowed",
                self.id, field, secs, max
            )));
        }
        Ok(Duration::seconds(secs as i64))
    }

    /// `delta_msec` as a duration, within one year either way.
    pub fn offset(&self) -> BotResult<Duration> {
        if !(-MAX_DELTA_MSEC..=MAX_DELTA_MSEC).contains(&self.delta_msec) {
            return Err(BotError::Config(format!(
                "bot #{}: 'delta_msec' is {}, at most {} either way allowed",
                self.id, self.delta_msec, MAX_DELTA_MSEC
            )));
        }
        Ok(Duration::milliseconds(self.delta_msec))
    }

    fn validate(&self) -> BotResult<()> {
        for (field, value) in [("name", &self.name), ("mode", &self.mode), ("url", &self.url)] {
            if value.trim().is_empty() {
                return Err(BotError::Config(format!("bot #{}: '{}' must not be empty", self.id, field)));
            }
        }
        if self.chain_id == 0 {
            return Err(BotError::Config(format!("bot #{}: 'chain_id' must be non-zero", self.id)));
        }
        self.mode()?;
        self.settings()?;
        Ok(())
    }

    pub fn mode(&self) -> BotResult<Mode> {
        let interval = self.bounded_secs("interval_secs", self.interval_secs, MAX_INTERVAL_SECS)?;
        Mode::from_name(&self.mode, self.fire_count, interval, self.offset()?)
            .map_err(|e| match e {
                BotError::Config(msg) => BotError::Config(format!("bot #{}: {}", self.id, msg)),
                other => other,
            })
    }

    pub fn start_time(&self) -> BotResult<DateTime<Utc>> {
        Utc.timestamp_opt(self.start_time, 0)
            .single()
            .ok_or_else(|| BotError::Config(format!("bot #{}: start_time {} out of range", self.id, self.start_time)))
    }

    pub fn settings(&self) -> BotResult<AgentSettings> {
        Ok(AgentSettings {
            bot_id: self.id,
            name: self.name.clone(),
            start_time: self.start_time()?,
            cooldown: self.bounded_secs("cooldown_secs", self.cooldown_secs, MAX_WAIT_SECS)?,
            reconcile_delay: self.bounded_secs("reconcile_delay_secs", self.reconcile_delay_secs, MAX_WAIT_SECS)?,
            scan_radius: self.scan_radius,
        })
    }

    pub fn gas_tracker(&self) -> GasTracker {
        GasTracker::new(self.gas_policy, U256::from(self.gas_price), U256::from(self.gas_limit))
    }

    /// Signing key from `secret`, or from the keystore named by
    /// `BOT_KEYSTORE` when `secret` is empty.
    pub fn load_wallet(&self) -> BotResult<LocalWallet> {
        self.load_wallet_with(|key| env::var(key).ok())
    }

    pub fn load_wallet_with<F>(&self, lookup: F) -> BotResult<LocalWallet>
    where
        F: Fn(&str) -> Option<String>,
    {
        let wallet = if !self.secret.is_empty() {
            wallet_from_secret(self.secret.expose())?
        } else {
            let path = lookup(KEYSTORE_ENV).ok_or_else(|| {
                BotError::Config(format!("bot #{}: 'secret' is empty and {} is not set", self.id, KEYSTORE_ENV))
            })?;
            let password = lookup(KEYSTORE_PASSWORD_ENV).unwrap_or_default();
            debug!(bot_id = self.id, keystore = %path, "Decrypting keystore.");
            wallet_from_keystore(&path, &password)?
        };
        let derived = TxSigner::address(&wallet);
        if derived != self.wallet {
            return Err(BotError::Config(format!(
                "bot #{}: key belongs to {:?}, config says {:?}",
                self.id, derived, self.wallet
            )));
        }
        Ok(wallet)
    }
}

/// Parses a config document holding one bot object or an array of them.
pub fn parse_configs(text: &str) -> BotResult<Vec<BotConfig>> {
    let document: Value = serde_json::from_str(text)?;
    let configs: Vec<BotConfig> = match document {
        Value::Array(_) => serde_json::from_value(document)?,
        Value::Object(_) => vec![serde_json::from_value(document)?],
        other => {
            return Err(BotError::Config(format!("expected an object or an array, got {}", other)))
        }
    };
    if configs.is_empty() {
        return Err(BotError::Config("no bots configured".into()));
    }
    for (i, config) in configs.iter().enumerate() {
        config.validate()?;
        if configs[..i].iter().any(|other| other.id == config.id) {
            return Err(BotError::Config(format!("duplicate bot id {}", config.id)));
        }
    }
    Ok(configs)
}

pub fn load_configs(path: impl AsRef<Path>) -> BotResult<Vec<BotConfig>> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading configuration...");
    let text = fs::read_to_string(path)
        .map_err(|e| BotError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let configs = parse_configs(&text)?;
    info!(bots = configs.len(), "Configuration loaded.");
    Ok(configs)
}

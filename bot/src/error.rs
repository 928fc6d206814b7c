// bot/src/error.rs

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduled time {target} is already in the past (now {now})")]
    ScheduleInPast {
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("ABI encoding failed: {0}")]
    Encoding(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("RPC transport failure in {method}: {message}")]
    Transport { method: String, message: String },

    #[error("RPC {method} returned no usable result: {message}")]
    RpcSemantic { method: String, message: String },

    #[error("Ledger write failed: {0}")]
    Ledger(String),
}

impl BotError {
    pub fn transport(method: &str, message: impl ToString) -> Self {
        BotError::Transport {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    pub fn semantic(method: &str, message: impl ToString) -> Self {
        BotError::RpcSemantic {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Fatal errors stop the agent; the rest only abandon the current cycle.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BotError::Transport { .. } | BotError::RpcSemantic { .. })
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Config(err.to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rpc_failures_are_recoverable() {
        assert!(!BotError::transport("eth_gasPrice", "timeout").is_fatal());
        assert!(!BotError::semantic("eth_call", "null result").is_fatal());
        assert!(BotError::Config("missing id".into()).is_fatal());
        assert!(BotError::Signing("no key".into()).is_fatal());
        assert!(BotError::Ledger("disk full".into()).is_fatal());
    }
}

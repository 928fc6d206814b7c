// bot/src/encoding.rs
// Calldata encoding for the compounding contract calls the bot issues.

use crate::bindings::i_compounder::{
    ApproveCall, CompoundCall, NearestCompoundingTimeCall, NearestCompoundingTimeReturn,
};
use crate::error::{BotError, BotResult};
use ethers::{
    abi::{AbiDecode, AbiEncode},
    contract::EthCall,
    types::{Address, Bytes, U256},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State-changing functions a prepared transaction can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetFunction {
    Approve,
    Compound,
}

impl fmt::Display for TargetFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetFunction::Approve => write!(f, "approve"),
            TargetFunction::Compound => write!(f, "compound"),
        }
    }
}

/// A fully parameterised contract call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    Approve { spender: Address, amount: U256 },
    Compound,
    NearestCompoundingTime,
}

impl FunctionCall {
    pub fn name(&self) -> &'static str {
        match self {
            FunctionCall::Approve { .. } => "approve",
            FunctionCall::Compound => "compound",
            FunctionCall::NearestCompoundingTime => "nearestCompoundingTime",
        }
    }

    /// The transaction target this call produces, `None` for read-only calls.
    pub fn target(&self) -> Option<TargetFunction> {
        match self {
            FunctionCall::Approve { .. } => Some(TargetFunction::Approve),
            FunctionCall::Compound => Some(TargetFunction::Compound),
            FunctionCall::NearestCompoundingTime => None,
        }
    }
}

/// ABI capability: selectors, calldata and result decoding.
pub trait AbiEncoder: Send + Sync {
    fn selector(&self, call: &FunctionCall) -> [u8; 4];
    fn encode(&self, call: &FunctionCall) -> BotResult<Bytes>;
    fn decode_compounding_time(&self, output: &[u8]) -> BotResult<U256>;
}

/// `AbiEncoder` backed by the generated `ICompounder` bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompounderAbi;

impl AbiEncoder for CompounderAbi {
    fn selector(&self, call: &FunctionCall) -> [u8; 4] {
        match call {
            FunctionCall::Approve { .. } => <ApproveCall as EthCall>::selector(),
            FunctionCall::Compound => <CompoundCall as EthCall>::selector(),
            FunctionCall::NearestCompoundingTime => <NearestCompoundingTimeCall as EthCall>::selector(),
        }
    }

    fn encode(&self, call: &FunctionCall) -> BotResult<Bytes> {
        let data = match call {
            FunctionCall::Approve { spender, amount } => ApproveCall {
                spender: *spender,
                amount: *amount,
            }
            .encode(),
            FunctionCall::Compound => CompoundCall.encode(),
            FunctionCall::NearestCompoundingTime => NearestCompoundingTimeCall.encode(),
        };
        let selector = self.selector(call);
        if data.len() < 4 || data[..4] != selector {
            return Err(BotError::Encoding(format!(
                "calldata for {} does not start with its selector",
                call.name()
            )));
        }
        Ok(Bytes::from(data))
    }

    fn decode_compounding_time(&self, output: &[u8]) -> BotResult<U256> {
        NearestCompoundingTimeReturn::decode(output)
            .map(|ret| ret.0)
            .map_err(|e| {
                BotError::Encoding(format!("nearestCompoundingTime output undecodable: {}", e))
            })
    }
}

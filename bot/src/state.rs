// bot/src/state.rs

use crate::gas::GasTracker;
use crate::transaction::NonceManager;
use ethers::types::Address;
use std::sync::Arc;

/// Per-agent account view: who signs, what is called, and the counters
/// feeding the next transaction.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub address: Address,
    pub contract: Address,
    /// Shared between agents signing with the same wallet.
    pub nonce: Arc<NonceManager>,
    pub gas: GasTracker,
}

impl AccountState {
    pub fn new(address: Address, contract: Address, nonce: Arc<NonceManager>, gas: GasTracker) -> Self {
        Self {
            address,
            contract,
            nonce,
            gas,
        }
    }
}

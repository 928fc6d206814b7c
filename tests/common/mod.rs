// tests/common/mod.rs
// In-memory chain used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use compound_bot::{
    encoding::CompounderAbi,
    error::{BotError, BotResult},
    gas::{GasPolicy, GasTracker},
    rpc::{CallRequest, ChainBlock, ChainClient, ChainReceipt, ChainTransaction},
    signer::{wallet_from_secret, TxSigner},
    state::AccountState,
    transaction::{NonceManager, TransactionBuilder},
};
use ethers::{
    abi::AbiEncode,
    signers::LocalWallet,
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, Signature, TxHash, U256},
    utils::{keccak256, rlp},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

pub const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const CHAIN_ID: u64 = 56;

pub fn contract() -> Address {
    "0x1111111111111111111111111111111111111111".parse().unwrap()
}

pub fn wallet() -> LocalWallet {
    wallet_from_secret(KEY).unwrap()
}

pub fn builder(nonce: Arc<NonceManager>, policy: GasPolicy) -> TransactionBuilder<LocalWallet> {
    let wallet = wallet();
    let address = TxSigner::address(&wallet);
    let gas = GasTracker::new(policy, U256::from(5_000_000_000u64), U256::from(300_000u64));
    let account = AccountState::new(address, contract(), nonce, gas);
    TransactionBuilder::new(Box::new(CompounderAbi), wallet, CHAIN_ID, account)
}

/// Splits a signed wire payload back into envelope and signature.
pub fn decode_raw(raw: &Bytes) -> (TypedTransaction, Signature) {
    TypedTransaction::decode_signed(&rlp::Rlp::new(raw.as_ref())).unwrap()
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_estimate: Option<U256>,
    pub balance: Option<U256>,
    pub compounding_time: U256,
    pub fail_sends: bool,
    pub fail_calls: bool,
    /// Replaces the encoded compounding time returned by `eth_call`.
    pub call_output: Option<Bytes>,
    pub sent: Vec<Bytes>,
    pub nonce_queries: usize,
    pub call_queries: usize,
    pub transactions: HashMap<TxHash, ChainTransaction>,
    pub receipts: HashMap<TxHash, ChainReceipt>,
    pub blocks: HashMap<u64, ChainBlock>,
}

/// `ChainClient` over a mutable in-memory state.
#[derive(Debug, Default)]
pub struct FakeChain {
    pub state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(nonce: u64) -> Arc<Self> {
        let chain = Self::default();
        {
            let mut s = chain.state.lock().unwrap();
            s.nonce = U256::from(nonce);
            s.gas_price = U256::from(1_000_000_000u64);
            s.gas_estimate = Some(U256::from(80_000u64));
            s.balance = Some(U256::exp10(18));
        }
        Arc::new(chain)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.with(|s| s.sent.clone())
    }

    /// Adds a block holding `txs` and indexes each body by hash.
    pub fn add_block(&self, number: u64, timestamp: u64, txs: Vec<ChainTransaction>) {
        self.with(|s| {
            for tx in &txs {
                s.transactions.insert(tx.hash, tx.clone());
            }
            s.blocks.insert(
                number,
                ChainBlock {
                    number: U256::from(number),
                    timestamp: U256::from(timestamp),
                    transactions: txs,
                },
            );
        });
    }

    pub fn add_receipt(&self, hash: TxHash, gas_used: u64, status: u64, log_count: usize) {
        self.with(|s| {
            s.receipts.insert(
                hash,
                ChainReceipt {
                    transaction_hash: hash,
                    gas_used: U256::from(gas_used),
                    effective_gas_price: None,
                    status: Some(U256::from(status)),
                    logs: vec![serde_json::Value::Null; log_count],
                },
            );
        });
    }
}

pub fn chain_tx(hash_byte: u8, from: Address, to: Option<Address>, input: Vec<u8>, gas_price: u64, block: u64) -> ChainTransaction {
    ChainTransaction {
        hash: TxHash::repeat_byte(hash_byte),
        from,
        to,
        input: Bytes::from(input),
        gas: U256::from(250_000u64),
        gas_price: Some(U256::from(gas_price)),
        block_number: Some(U256::from(block)),
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn transaction_count(&self, _address: Address) -> BotResult<U256> {
        Ok(self.with(|s| {
            s.nonce_queries += 1;
            s.nonce
        }))
    }

    async fn gas_price(&self) -> BotResult<U256> {
        Ok(self.with(|s| s.gas_price))
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> BotResult<U256> {
        self.with(|s| s.gas_estimate)
            .ok_or_else(|| BotError::transport("eth_estimateGas", "execution reverted"))
    }

    async fn balance(&self, _address: Address) -> BotResult<Option<U256>> {
        Ok(self.with(|s| s.balance))
    }

    async fn call(&self, _call: &CallRequest) -> BotResult<Bytes> {
        self.with(|s| {
            s.call_queries += 1;
            if s.fail_calls {
                return Err(BotError::transport("eth_call", "connection reset"));
            }
            Ok(s.call_output
                .clone()
                .unwrap_or_else(|| Bytes::from(s.compounding_time.encode())))
        })
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> BotResult<TxHash> {
        self.with(|s| {
            if s.fail_sends {
                return Err(BotError::semantic("eth_sendRawTransaction", "missing transaction hash"));
            }
            s.sent.push(raw.clone());
            Ok(TxHash::from(keccak256(raw.as_ref())))
        })
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> BotResult<Option<ChainTransaction>> {
        Ok(self.with(|s| s.transactions.get(&hash).cloned()))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BotResult<Option<ChainReceipt>> {
        Ok(self.with(|s| s.receipts.get(&hash).cloned()))
    }

    async fn block_by_number(&self, number: u64) -> BotResult<Option<ChainBlock>> {
        Ok(self.with(|s| s.blocks.get(&number).cloned()))
    }
}

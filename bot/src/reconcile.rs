// bot/src/reconcile.rs
//! Post-submission accounting of every transaction that called the same
//! contract function in the blocks around our own.
//!
//! Matching is by destination plus 4-byte selector. That is a best-effort
//! correlation: two unrelated calls can share both.

use crate::error::{BotError, BotResult};
use crate::ledger::{Ledger, ReconciliationRecord};
use crate::rpc::{ChainClient, ChainTransaction};
use crate::utils::fee_in_native;
use ethers::types::{Address, TxHash};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_SCAN_RADIUS: u64 = 2;

#[derive(Debug, Clone)]
pub struct ReconciliationScanner {
    bot_id: u32,
    delta_msec: i64,
    radius: u64,
}

/// A matching transaction before its receipt is known.
#[derive(Debug, Clone)]
struct Candidate {
    tx: ChainTransaction,
    block_number: u64,
    timestamp: u64,
}

impl ReconciliationScanner {
    pub fn new(bot_id: u32, delta_msec: i64, radius: u64) -> Self {
        Self {
            bot_id,
            delta_msec,
            radius,
        }
    }

    /// Scans around `own_hash` and returns one record per match, in block and
    /// position order. Read-only on chain.
    #[instrument(skip(self, client), fields(bot_id = self.bot_id))]
    pub async fn scan<C: ChainClient + ?Sized>(&self, client: &C, own_hash: TxHash) -> BotResult<Vec<ReconciliationRecord>> {
        let method = "eth_getTransactionByHash";
        let own = client
            .transaction_by_hash(own_hash)
            .await?
            .ok_or_else(|| BotError::semantic(method, format!("transaction {:?} not found", own_hash)))?;
        let own_block = own
            .block_number
            .ok_or_else(|| BotError::semantic(method, format!("transaction {:?} not mined yet", own_hash)))?
            .low_u64();
        let contract = own
            .to
            .ok_or_else(|| BotError::semantic(method, "own transaction has no destination"))?;
        let selector = own
            .selector()
            .ok_or_else(|| BotError::semantic(method, "own transaction has no function selector"))?;

        let first = own_block.saturating_sub(self.radius);
        let last = own_block.saturating_add(self.radius);
        debug!(own_block, first, last, selector = %hex::encode(selector), "Scanning block window.");

        let mut candidates = Vec::new();
        for number in first..=last {
            let block = match client.block_by_number(number).await? {
                Some(block) => block,
                None => {
                    warn!(block = number, "Block not available, skipping.");
                    continue;
                }
            };
            let timestamp = block.timestamp.low_u64();
            candidates.extend(
                block
                    .transactions
                    .into_iter()
                    .filter(|tx| is_match(tx, contract, selector))
                    .map(|tx| Candidate { tx, block_number: number, timestamp }),
            );
        }
        info!(matches = candidates.len(), "Matching transactions found.");

        let mut records = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.into_iter().enumerate() {
            let hash = candidate.tx.hash;
            let receipt = client
                .transaction_receipt(hash)
                .await?
                .ok_or_else(|| BotError::semantic("eth_getTransactionReceipt", format!("no receipt for {:?}", hash)))?;
            let gas_price = candidate.tx.gas_price.or(receipt.effective_gas_price);
            if gas_price.is_none() {
                warn!(?hash, "Gas price unknown, fee left unset.");
            }
            let status = receipt.status.map(|s| s.low_u64());
            if status.is_none() {
                warn!(?hash, "Receipt carries no status.");
            }
            records.push(ReconciliationRecord {
                index,
                block_number: candidate.block_number,
                tx_hash: hash,
                from: candidate.tx.from,
                to: contract,
                gas_limit: candidate.tx.gas,
                gas_price,
                gas_used: receipt.gas_used,
                status,
                log_count: receipt.logs.len(),
                fee_native: gas_price.map(|price| fee_in_native(receipt.gas_used, price)),
                timestamp_unix: candidate.timestamp,
                bot_id: self.bot_id,
                observed_delta_msec: if hash == own_hash { self.delta_msec } else { 0 },
            });
        }
        Ok(records)
    }

    /// Scans and writes every record. Call once per own submission: records
    /// are appended, not deduplicated.
    pub async fn scan_and_store<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        ledger: &dyn Ledger,
        own_hash: TxHash,
    ) -> BotResult<usize> {
        let records = self.scan(client, own_hash).await?;
        for record in &records {
            ledger.store(record)?;
        }
        Ok(records.len())
    }
}

fn is_match(tx: &ChainTransaction, contract: Address, selector: [u8; 4]) -> bool {
    tx.to == Some(contract) && tx.selector() == Some(selector)
}

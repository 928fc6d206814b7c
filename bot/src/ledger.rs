// bot/src/ledger.rs

use crate::error::{BotError, BotResult};
use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::info;

/// One transaction found by a reconciliation scan. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRecord {
    pub index: usize,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub gas_limit: U256,
    /// `None` when neither the transaction nor its receipt carried a price.
    pub gas_price: Option<U256>,
    pub gas_used: U256,
    /// `None` for pre-Byzantium receipts without a status field.
    pub status: Option<u64>,
    pub log_count: usize,
    pub fee_native: Option<f64>,
    pub timestamp_unix: u64,
    pub bot_id: u32,
    /// Scheduling offset of our own submission; zero for everyone else's.
    pub observed_delta_msec: i64,
}

/// Sink for reconciliation records. A failed store is fatal to the caller.
pub trait Ledger: Send + Sync {
    fn store(&self, record: &ReconciliationRecord) -> BotResult<()>;
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlLedger {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlLedger {
    pub fn open(path: impl AsRef<Path>) -> BotResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| BotError::Ledger(format!("cannot open {:?}: {}", path, e)))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Ledger for JsonlLedger {
    fn store(&self, record: &ReconciliationRecord) -> BotResult<()> {
        let line = serde_json::to_string(record).map_err(|e| BotError::Ledger(e.to_string()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BotError::Ledger("ledger writer poisoned".into()))?;
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| BotError::Ledger(format!("write to {:?} failed: {}", self.path, e)))
    }
}

/// Emits each record as a log line only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLedger;

impl Ledger for LogLedger {
    fn store(&self, r: &ReconciliationRecord) -> BotResult<()> {
        info!(
            target: "ledger",
            timestamp = r.timestamp_unix,
            index = r.index,
            from = ?r.from,
            fee = ?r.fee_native,
            logs = r.log_count,
            gas_limit = %r.gas_limit,
            status = ?r.status,
            hash = ?r.tx_hash,
            block = r.block_number,
            gas_price = ?r.gas_price,
            gas_used = %r.gas_used,
            bot_id = r.bot_id,
            delta_msec = r.observed_delta_msec,
            "Reconciled transaction"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<ReconciliationRecord>>,
}

impl MemoryLedger {
    pub fn records(&self) -> Vec<ReconciliationRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Ledger for MemoryLedger {
    fn store(&self, record: &ReconciliationRecord) -> BotResult<()> {
        self.records
            .lock()
            .map_err(|_| BotError::Ledger("memory ledger poisoned".into()))?
            .push(record.clone());
        Ok(())
    }
}

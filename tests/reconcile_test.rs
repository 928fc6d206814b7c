// tests/reconcile_test.rs

mod common;

// --- Imports ---
use common::{chain_tx, contract, FakeChain};
use compound_bot::{
    error::BotError,
    ledger::{JsonlLedger, Ledger, MemoryLedger},
    reconcile::ReconciliationScanner,
};
use ethers::{
    types::{Address, TxHash, U256},
    utils::id,
};
use std::{fs, sync::Arc};

const BOT_ID: u32 = 9;
const DELTA_MSEC: i64 = 250;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn compound() -> Vec<u8> {
    id("compound()").to_vec()
}

/// Blocks 98..=101 around our own transaction (0xcc) in block 100. Block 102
/// is not available. Two transactions match, three do not.
fn seeded_chain() -> Arc<FakeChain> {
    let chain = FakeChain::new(0);
    let mut approve = id("approve(address,uint256)").to_vec();
    approve.extend_from_slice(&[0u8; 64]);

    chain.add_block(98, 1_000, vec![]);
    chain.add_block(
        99,
        1_003,
        vec![chain_tx(0xaa, addr(0xa1), Some(contract()), compound(), 5_000_000_000, 99)],
    );
    chain.add_block(
        100,
        1_006,
        vec![
            chain_tx(0xbb, addr(0xb1), Some(contract()), approve, 5_000_000_000, 100),
            chain_tx(0xcc, addr(0xc1), Some(contract()), compound(), 6_000_000_000, 100),
        ],
    );
    chain.add_block(
        101,
        1_009,
        vec![
            chain_tx(0xdd, addr(0xd1), Some(addr(0x99)), compound(), 5_000_000_000, 101),
            chain_tx(0xee, addr(0xe1), Some(contract()), vec![], 5_000_000_000, 101),
        ],
    );
    chain.add_receipt(TxHash::repeat_byte(0xaa), 21_000, 1, 2);
    chain.add_receipt(TxHash::repeat_byte(0xcc), 50_000, 0, 0);
    chain
}

#[tokio::test]
async fn window_yields_only_matching_transactions_in_order() {
    let chain = seeded_chain();
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);
    let own = TxHash::repeat_byte(0xcc);

    let records = scanner.scan(chain.as_ref(), own).await.unwrap();
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.index, 0);
    assert_eq!(first.tx_hash, TxHash::repeat_byte(0xaa));
    assert_eq!(first.block_number, 99);
    assert_eq!(first.timestamp_unix, 1_003);
    assert_eq!(first.from, addr(0xa1));
    assert_eq!(first.to, contract());
    assert_eq!(first.gas_used, U256::from(21_000u64));
    assert_eq!(first.gas_price, Some(U256::from(5_000_000_000u64)));
    assert_eq!(first.status, Some(1));
    assert_eq!(first.log_count, 2);
    assert!((first.fee_native.unwrap() - 0.000105).abs() < 1e-12);
    assert_eq!(first.observed_delta_msec, 0);
    assert_eq!(first.bot_id, BOT_ID);

    let second = &records[1];
    assert_eq!(second.index, 1);
    assert_eq!(second.tx_hash, own);
    assert_eq!(second.block_number, 100);
    assert_eq!(second.timestamp_unix, 1_006);
    assert_eq!(second.status, Some(0));
    assert!((second.fee_native.unwrap() - 0.0003).abs() < 1e-12);
    assert_eq!(second.observed_delta_msec, DELTA_MSEC);
}

#[tokio::test]
async fn every_record_reaches_the_ledger() {
    let chain = seeded_chain();
    let ledger = MemoryLedger::default();
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);

    let stored = scanner
        .scan_and_store(chain.as_ref(), &ledger, TxHash::repeat_byte(0xcc))
        .await
        .unwrap();
    assert_eq!(stored, 2);
    assert_eq!(ledger.records().len(), 2);

    // Rescanning is not deduplicated.
    scanner
        .scan_and_store(chain.as_ref(), &ledger, TxHash::repeat_byte(0xcc))
        .await
        .unwrap();
    assert_eq!(ledger.records().len(), 4);
}

#[tokio::test]
async fn window_saturates_at_genesis() {
    let chain = FakeChain::new(0);
    chain.add_block(0, 10, vec![]);
    chain.add_block(1, 13, vec![chain_tx(0x11, addr(0x01), Some(contract()), compound(), 1, 1)]);
    chain.add_receipt(TxHash::repeat_byte(0x11), 30_000, 1, 1);

    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);
    let records = scanner.scan(chain.as_ref(), TxHash::repeat_byte(0x11)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].block_number, 1);
}

#[tokio::test]
async fn unmined_or_unknown_own_transaction_is_semantic_error() {
    let chain = FakeChain::new(0);
    let mut pending = chain_tx(0x22, addr(0x02), Some(contract()), compound(), 1, 0);
    pending.block_number = None;
    chain.with(|s| {
        s.transactions.insert(pending.hash, pending.clone());
    });
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);

    let err = scanner.scan(chain.as_ref(), pending.hash).await.unwrap_err();
    assert!(matches!(err, BotError::RpcSemantic { .. }));
    let err = scanner.scan(chain.as_ref(), TxHash::repeat_byte(0x33)).await.unwrap_err();
    assert!(matches!(err, BotError::RpcSemantic { .. }));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn unknown_price_and_status_are_not_zero() {
    let chain = FakeChain::new(0);
    let mut own = chain_tx(0x44, addr(0x04), Some(contract()), compound(), 0, 50);
    own.gas_price = None;
    chain.add_block(50, 2_000, vec![own.clone()]);
    chain.add_receipt(own.hash, 40_000, 1, 0);
    chain.with(|s| {
        if let Some(receipt) = s.receipts.get_mut(&own.hash) {
            receipt.status = None;
        }
    });
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);

    let records = scanner.scan(chain.as_ref(), own.hash).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].gas_price, None);
    assert_eq!(records[0].fee_native, None);
    assert_eq!(records[0].status, None);

    // The receipt's effective price fills in for a missing transaction price.
    chain.with(|s| {
        if let Some(receipt) = s.receipts.get_mut(&own.hash) {
            receipt.effective_gas_price = Some(U256::from(2_000_000_000u64));
        }
    });
    let records = scanner.scan(chain.as_ref(), own.hash).await.unwrap();
    assert_eq!(records[0].gas_price, Some(U256::from(2_000_000_000u64)));
    assert!((records[0].fee_native.unwrap() - 0.00008).abs() < 1e-12);
}

#[tokio::test]
async fn missing_receipt_aborts_the_scan() {
    let chain = seeded_chain();
    chain.with(|s| {
        s.receipts.remove(&TxHash::repeat_byte(0xaa));
    });
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);
    let err = scanner.scan(chain.as_ref(), TxHash::repeat_byte(0xcc)).await.unwrap_err();
    assert!(matches!(err, BotError::RpcSemantic { .. }));
}

#[tokio::test]
async fn jsonl_ledger_appends_one_object_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.jsonl");
    let chain = seeded_chain();
    let scanner = ReconciliationScanner::new(BOT_ID, DELTA_MSEC, 2);
    let records = scanner.scan(chain.as_ref(), TxHash::repeat_byte(0xcc)).await.unwrap();

    {
        let ledger = JsonlLedger::open(&path).unwrap();
        assert_eq!(ledger.path(), path.as_path());
        ledger.store(&records[0]).unwrap();
    }
    let reopened = JsonlLedger::open(&path).unwrap();
    reopened.store(&records[1]).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["index"], 0);
    assert_eq!(lines[0]["block_number"], 99);
    assert_eq!(lines[1]["index"], 1);
    assert_eq!(lines[1]["observed_delta_msec"], DELTA_MSEC);
    assert_eq!(lines[1]["bot_id"], BOT_ID);
    assert_eq!(lines[1]["tx_hash"], format!("{:?}", TxHash::repeat_byte(0xcc)));
}

#[test]
fn jsonl_ledger_open_failure_is_ledger_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JsonlLedger::open(dir.path().join("missing").join("records.jsonl")).unwrap_err();
    assert!(matches!(err, BotError::Ledger(_)));
    assert!(err.is_fatal());
}

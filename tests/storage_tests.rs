//! Unit tests for persisted oracle state
//!
//! Covers checkpoints, the durable wrap queues, dead-letter records and the
//! audit logs, each against a temporary log directory.

use std::collections::HashSet;
use std::fs;

use fio_oracle::intent::{Chain, Direction, WrapPayload};
use fio_oracle::monitor::WatcherId;
use fio_oracle::storage::{
    format_line, CheckpointStore, DeadLetterStore, ErrorContext, OracleLogs, QueueEntry,
    StorageLayout, TransferQueue,
};

#[path = "helpers.rs"]
mod helpers;
use helpers::DUMMY_DESTINATION_EVM;

fn token_entry(tx_id: &str, amount: u64) -> QueueEntry {
    QueueEntry {
        source_tx_id: tx_id.to_string(),
        payload: WrapPayload {
            public_address: DUMMY_DESTINATION_EVM.to_string(),
            chain_code: "ETH".to_string(),
            amount: Some(amount),
            fio_domain: None,
            extra: serde_json::Map::new(),
        },
    }
}

fn ids(entries: &[QueueEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.source_tx_id.as_str()).collect()
}

// ============================================================================
// FILE LAYOUT
// ============================================================================

/// 1. Test: File Names
/// Verifies the file name of every piece of persisted state.
/// Why: Operators and recovery scripts locate queues and checkpoints by these names.
#[test]
fn test_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path().join("logs")).unwrap();
    let name = |p: std::path::PathBuf| p.file_name().unwrap().to_string_lossy().to_string();

    assert!(layout.root().is_dir(), "Layout should create the directory");
    assert_eq!(name(layout.queue(Direction::WrapTokensEth)), "WrapTokensEthQueue.log");
    assert_eq!(name(layout.queue(Direction::WrapDomainPolygon)), "WrapDomainPolygonQueue.log");
    assert_eq!(
        name(layout.dead_letter(Direction::UnwrapDomainEth)),
        "UnwrapDomainEthErrQueue.log"
    );
    assert_eq!(name(layout.checkpoint(WatcherId::FioWrap)), "blockNumberFIO.log");
    assert_eq!(
        name(layout.checkpoint(WatcherId::EvmUnwrap(Direction::UnwrapTokensEth))),
        "blockNumberETH.log"
    );
    assert_eq!(
        name(layout.checkpoint(WatcherId::EvmUnwrap(Direction::UnwrapDomainEth))),
        "blockNumberDomainETH.log"
    );
    assert_eq!(
        name(layout.checkpoint(WatcherId::EvmUnwrap(Direction::UnwrapDomainPolygon))),
        "blockNumberMATIC.log"
    );
    assert_eq!(name(layout.chain_log(Chain::Polygon)), "MATIC.log");
    assert_eq!(name(layout.error_log()), "Error.log");
}

/// 2. Test: Line Record Rejects Whitespace Ids
/// Verifies that ids which would break the "<id> <json>" format are refused.
/// Why: A space inside the id would shift the JSON and corrupt the record.
#[test]
fn test_line_record_rejects_whitespace_ids() {
    assert!(format_line("abc def", &serde_json::json!({})).is_err());
    assert!(format_line("", &serde_json::json!({})).is_err());
    assert_eq!(
        format_line("abc", &serde_json::json!({"a": 1})).unwrap(),
        r#"abc {"a":1}"#
    );
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

/// 3. Test: Checkpoint Seeding
/// Verifies that a missing checkpoint is seeded once and then read back.
/// Why: First start begins at the chain head instead of replaying history.
#[tokio::test]
async fn test_checkpoint_seeding() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("blockNumberETH.log"));

    assert_eq!(store.get().unwrap(), None);
    let seeded = store.load_or_seed(|| async { Ok(500) }).await.unwrap();
    assert_eq!(seeded, 500);

    // A second seed is not consulted
    let again = store
        .load_or_seed(|| async { Err(anyhow::anyhow!("seed must not be called")) })
        .await
        .unwrap();
    assert_eq!(again, 500);
}

/// 4. Test: Checkpoint Is Monotonic
/// Verifies that advance never lowers the stored block and survives a reopen.
/// Why: Moving a checkpoint backwards would replay already relayed intents.
#[test]
fn test_checkpoint_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blockNumberFIO.log");
    let store = CheckpointStore::new(&path);

    assert_eq!(store.advance(100).unwrap(), 100);
    assert_eq!(store.advance(90).unwrap(), 100);
    assert_eq!(store.advance(120).unwrap(), 120);

    let reopened = CheckpointStore::new(&path);
    assert_eq!(reopened.get().unwrap(), Some(120));
    assert_eq!(fs::read_to_string(&path).unwrap(), "120");
}

/// 5. Test: Corrupt Checkpoint
/// Verifies that a non-numeric checkpoint is an error rather than a silent reseed.
/// Why: Reseeding over a corrupt file would skip every intent since the last good value.
#[test]
fn test_corrupt_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blockNumberETH.log");
    fs::write(&path, "12a").unwrap();

    let err = CheckpointStore::new(&path).get().unwrap_err();
    assert!(err.to_string().contains("Corrupt checkpoint"));
}

// ============================================================================
// QUEUES
// ============================================================================

/// 6. Test: Queue FIFO Order And Deduplication
/// Verifies that entries come back in arrival order and duplicate ids are ignored.
/// Why: Wraps must be relayed in the order FIO emitted them, exactly once.
#[test]
fn test_queue_fifo_and_dedupe() {
    let dir = tempfile::tempdir().unwrap();
    let queue = TransferQueue::open(dir.path().join("WrapTokensEthQueue.log")).unwrap();

    assert!(queue.enqueue(&token_entry("A", 1)).unwrap());
    assert!(queue.enqueue(&token_entry("B", 2)).unwrap());
    assert!(!queue.enqueue(&token_entry("A", 1)).unwrap());
    assert!(queue.enqueue(&token_entry("C", 3)).unwrap());

    assert_eq!(ids(&queue.pending().unwrap()), vec!["A", "B", "C"]);
    assert_eq!(queue.head().unwrap().unwrap(), token_entry("A", 1));
    assert_eq!(queue.len().unwrap(), 3);
}

/// 7. Test: Queue Line Format
/// Verifies the on-disk entry format.
/// Why: Queue files are read and repaired by hand during incidents.
#[test]
fn test_queue_line_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapTokensEthQueue.log");
    let queue = TransferQueue::open(&path).unwrap();
    queue.enqueue(&token_entry("tx123", 5_000_000_000)).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(
        content,
        format!(
            "tx123 {{\"public_address\":\"{}\",\"chain_code\":\"ETH\",\"amount\":5000000000}}\r\n",
            DUMMY_DESTINATION_EVM
        )
    );
}

/// 8. Test: Acknowledge And Compact
/// Verifies that acknowledged entries leave the queue and a drained queue is truncated.
/// Why: The files must not grow without bound across months of operation.
#[test]
fn test_ack_and_compact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapDomainEthQueue.log");
    let queue = TransferQueue::open(&path).unwrap();
    queue.enqueue(&token_entry("A", 1)).unwrap();
    queue.enqueue(&token_entry("B", 2)).unwrap();

    assert!(queue.ack("A").unwrap());
    assert!(!queue.ack("A").unwrap(), "Second ack of the same id is a no-op");
    assert_eq!(ids(&queue.pending().unwrap()), vec!["B"]);
    assert!(fs::metadata(&path).unwrap().len() > 0);

    assert!(queue.ack("B").unwrap());
    assert!(queue.is_empty().unwrap());
    assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    assert_eq!(fs::metadata(path.with_extension("ack")).unwrap().len(), 0);
}

/// 9. Test: Queue Survives Reopen
/// Verifies that pending entries and acknowledgements are recovered after a restart.
/// Why: A crash must neither lose an intent nor resend an acknowledged one.
#[test]
fn test_queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapTokensEthQueue.log");
    {
        let queue = TransferQueue::open(&path).unwrap();
        queue.enqueue(&token_entry("A", 1)).unwrap();
        queue.enqueue(&token_entry("B", 2)).unwrap();
        queue.ack("A").unwrap();
    }

    let queue = TransferQueue::open(&path).unwrap();
    assert_eq!(ids(&queue.pending().unwrap()), vec!["B"]);
    assert!(!queue.enqueue(&token_entry("A", 1)).unwrap());
}

/// 10. Test: Torn Tail Line
/// Verifies that a partially written last line is ignored and the next append starts cleanly.
/// Why: A crash mid-write must not corrupt the entries around it.
#[test]
fn test_torn_tail_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapTokensEthQueue.log");
    {
        let queue = TransferQueue::open(&path).unwrap();
        queue.enqueue(&token_entry("A", 1)).unwrap();
    }
    let mut content = fs::read_to_string(&path).unwrap();
    content.push_str("B {\"public_add");
    fs::write(&path, content).unwrap();

    let queue = TransferQueue::open(&path).unwrap();
    assert_eq!(ids(&queue.pending().unwrap()), vec!["A"]);

    queue.enqueue(&token_entry("C", 3)).unwrap();
    assert_eq!(ids(&queue.pending().unwrap()), vec!["A", "C"]);
}

/// 11. Test: Next Entry Excluding Dead Letters
/// Verifies that the executor's view skips excluded ids while keeping order.
/// Why: A dead-lettered entry stays in the file but must not block later entries forever.
#[test]
fn test_next_excluding() {
    let dir = tempfile::tempdir().unwrap();
    let queue = TransferQueue::open(dir.path().join("WrapTokensEthQueue.log")).unwrap();
    queue.enqueue(&token_entry("A", 1)).unwrap();
    queue.enqueue(&token_entry("B", 2)).unwrap();

    let skip: HashSet<String> = ["A".to_string()].into_iter().collect();
    assert_eq!(queue.next_excluding(&skip).unwrap().unwrap().source_tx_id, "B");

    let skip: HashSet<String> = ["A".to_string(), "B".to_string()].into_iter().collect();
    assert!(queue.next_excluding(&skip).unwrap().is_none());
}

/// 12. Test: Extra Action Fields Preserved
/// Verifies that fields the relay does not use survive a queue round trip.
/// Why: Queue lines are the audit record of the FIO action as discovered.
#[test]
fn test_extra_action_fields_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapDomainPolygonQueue.log");
    fs::write(
        &path,
        "d1 {\"public_address\":\"0xabc\",\"chain_code\":\"MATIC\",\"fio_domain\":\"dom\",\"max_oracle_fee\":\"4000000000\",\"tpid\":\"\"}\r\n",
    )
    .unwrap();

    let queue = TransferQueue::open(&path).unwrap();
    let head = queue.head().unwrap().unwrap();
    assert_eq!(head.payload.fio_domain.as_deref(), Some("dom"));
    assert_eq!(head.payload.amount, None);
    assert_eq!(head.payload.extra["max_oracle_fee"], "4000000000");
}

// ============================================================================
// DEAD LETTERS AND AUDIT LOGS
// ============================================================================

/// 13. Test: Dead Letter Records
/// Verifies append, listing and id lookup of dead letters.
/// Why: Operators replay failed intents from these records.
#[test]
fn test_dead_letter_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = DeadLetterStore::new(dir.path().join("UnwrapTokensEthErrQueue.log"));

    assert!(store.records().unwrap().is_empty());
    store
        .append("0xaaa", &serde_json::json!({"fio_address": "alice@fio", "amount": 7}))
        .unwrap();
    store.append("0xbbb", &serde_json::json!({"amount": 8})).unwrap();

    let records = store.records().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].source_tx_id, "0xaaa");
    assert_eq!(records[0].payload["amount"], 7);
    assert!(store.contains("0xbbb").unwrap());
    assert!(!store.contains("0xccc").unwrap());
    assert_eq!(store.tx_ids().unwrap().len(), 2);
}

/// 14. Test: Error Log Records
/// Verifies that errors land in Error.log as single timestamped lines with their context.
/// Why: Error.log is the one place operators check; multi-line entries break tooling.
#[test]
fn test_error_log_records() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path()).unwrap();
    let logs = OracleLogs::new(layout.clone());

    logs.record_error(
        &ErrorContext::new(Chain::Ethereum, "fio.erc20", "wraptokens", "Executing tx123"),
        &"first line\nsecond line",
    );

    let content = fs::read_to_string(layout.error_log()).unwrap();
    let lines: Vec<&str> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("ETH fio.erc20 wraptokens Executing tx123: first line, second line"));
}

/// 15. Test: Chain JSON Records
/// Verifies that JSON records get a timestamp field and go to the chain's log.
/// Why: Chain logs are the per-chain audit trail of discovered actions.
#[test]
fn test_chain_json_records() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path()).unwrap();
    let logs = OracleLogs::new(layout.clone());

    logs.chain_json(Chain::Fio, serde_json::json!({"action": "wraptokens"}));
    logs.chain_text(Chain::Ethereum, "ETH fio.erc20 wraptokens submit");

    let fio = fs::read_to_string(layout.chain_log(Chain::Fio)).unwrap();
    let record: serde_json::Value = serde_json::from_str(fio.trim_end()).unwrap();
    assert_eq!(record["action"], "wraptokens");
    assert!(record["timeStamp"].is_string());

    let eth = fs::read_to_string(layout.chain_log(Chain::Ethereum)).unwrap();
    assert!(eth.trim_end().ends_with("ETH fio.erc20 wraptokens submit"));
}

/// 16. Test: Compaction Around Parked Entries
/// Verifies that once only dead-lettered entries remain, the entry log is rewritten to hold
/// just those lines and the acknowledgement log is cleared.
/// Why: A single dead letter would otherwise keep every acknowledged line on disk forever.
#[test]
fn test_compaction_around_parked_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("WrapTokensEthQueue.log");
    let acks = path.with_extension("ack");
    let queue = TransferQueue::open(&path).unwrap();
    for (id, amount) in [("A", 1u64), ("B", 2), ("C", 3), ("D", 4)] {
        queue.enqueue(&token_entry(id, amount)).unwrap();
    }
    let parked: HashSet<String> = ["B".to_string()].into_iter().collect();

    assert!(queue.ack_with_parked("A", &parked).unwrap());
    assert!(queue.ack_with_parked("C", &parked).unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4, "D is still pending");
    let before = fs::metadata(&path).unwrap().len();

    assert!(queue.ack_with_parked("D", &parked).unwrap());
    let entries = fs::read_to_string(&path).unwrap();
    assert_eq!(entries, format!("{}\r\n", format_line("B", &token_entry("B", 2).payload).unwrap()));
    assert!(fs::metadata(&path).unwrap().len() < before);
    assert_eq!(fs::metadata(&acks).unwrap().len(), 0);
    assert_eq!(ids(&queue.pending().unwrap()), vec!["B"]);

    // Compacted state survives a restart and still dedupes the parked id
    let queue = TransferQueue::open(&path).unwrap();
    assert_eq!(ids(&queue.pending().unwrap()), vec!["B"]);
    assert!(!queue.enqueue(&token_entry("B", 2)).unwrap());
    assert!(queue.contains_pending("B").unwrap());
    assert!(!queue.contains_pending("A").unwrap());

    // Plain ack keeps the old behavior: no parked set, no rewrite
    queue.enqueue(&token_entry("E", 5)).unwrap();
    assert!(queue.ack("E").unwrap());
    assert_eq!(ids(&queue.pending().unwrap()), vec!["B"]);
    assert_eq!(fs::read_to_string(&acks).unwrap(), "E\r\n");
}

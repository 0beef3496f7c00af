//! Storage Module
//!
//! Plain-text persisted state of the oracle, all under one log directory:
//! - per-watcher block checkpoints (`blockNumber*.log`)
//! - per-direction wrap queues (`*Queue.log` + `*Queue.ack`)
//! - per-direction dead-letter records (`*ErrQueue.log`)
//! - per-chain audit logs (`FIO.log`, `ETH.log`, `MATIC.log`) and `Error.log`
//!
//! Queue and dead-letter lines share the `"<sourceTxId> <JSON payload>\r\n"` format.

pub mod checkpoint;
pub mod dead_letter;
pub mod event_log;
pub mod queue;

pub use checkpoint::CheckpointStore;
pub use dead_letter::{DeadLetterRecord, DeadLetterStore};
pub use event_log::{ErrorContext, OracleLogs};
pub use queue::{QueueEntry, TransferQueue};

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::intent::{Chain, Direction};
use crate::monitor::WatcherId;

/// Line terminator of every persisted record.
pub const LINE_END: &str = "\r\n";

// ============================================================================
// FILE LAYOUT
// ============================================================================

/// Maps every piece of persisted state to its file under the log directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Creates the layout, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create log directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chain_log(&self, chain: Chain) -> PathBuf {
        self.root.join(format!("{}.log", chain.code()))
    }

    pub fn error_log(&self) -> PathBuf {
        self.root.join("Error.log")
    }

    pub fn checkpoint(&self, watcher: WatcherId) -> PathBuf {
        let name = match watcher {
            WatcherId::FioWrap => "blockNumberFIO.log",
            WatcherId::EvmUnwrap(Direction::UnwrapDomainEth) => "blockNumberDomainETH.log",
            WatcherId::EvmUnwrap(Direction::UnwrapDomainPolygon) => "blockNumberMATIC.log",
            WatcherId::EvmUnwrap(_) => "blockNumberETH.log",
        };
        self.root.join(name)
    }

    /// Entry log of a wrap queue; the acknowledgement log sits next to it.
    pub fn queue(&self, direction: Direction) -> PathBuf {
        self.root.join(format!("{}Queue.log", direction.file_stem()))
    }

    pub fn dead_letter(&self, direction: Direction) -> PathBuf {
        self.root.join(format!("{}ErrQueue.log", direction.file_stem()))
    }
}

// ============================================================================
// LINE RECORDS
// ============================================================================

/// Formats `"<tx_id> <json>"` without the terminator.
pub fn format_line<T: Serialize>(tx_id: &str, payload: &T) -> Result<String> {
    if tx_id.is_empty() || tx_id.contains(char::is_whitespace) {
        anyhow::bail!("Transaction id '{}' cannot be stored in a line record", tx_id);
    }
    let json = serde_json::to_string(payload).context("Failed to serialize payload")?;
    Ok(format!("{} {}", tx_id, json))
}

/// Parses a `"<tx_id> <json>"` line.
pub fn parse_line<T: DeserializeOwned>(line: &str) -> Result<(String, T)> {
    let (tx_id, json) = line
        .split_once(' ')
        .ok_or_else(|| anyhow::anyhow!("Malformed record line: '{}'", line))?;
    let payload = serde_json::from_str(json)
        .with_context(|| format!("Malformed JSON payload for {}", tx_id))?;
    Ok((tx_id.to_string(), payload))
}

/// Reads the terminated lines of a file; a torn trailing line is dropped.
pub(crate) fn read_complete_lines(path: &Path) -> Result<Vec<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };

    let mut lines: Vec<&str> = content.split(LINE_END).collect();
    // The piece after the last terminator is either empty or a torn write.
    lines.pop();
    Ok(lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Appends one terminated line and syncs it to disk.
///
/// A torn tail left by a crash is terminated first so the new record starts
/// on its own line.
pub(crate) fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let len = file.metadata()?.len();
    let mut record = String::with_capacity(line.len() + 4);
    if len >= 2 {
        let mut tail = [0u8; 2];
        file.seek(SeekFrom::Start(len - 2))?;
        file.read_exact(&mut tail)?;
        if &tail[..] != LINE_END.as_bytes() {
            record.push_str(LINE_END);
        }
    } else if len == 1 {
        record.push_str(LINE_END);
    }
    record.push_str(line);
    record.push_str(LINE_END);

    file.write_all(record.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    file.sync_data()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    Ok(())
}

/// Replaces a file's contents through a temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Truncates a file to zero length, creating it if missing.
pub(crate) fn truncate(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("Failed to truncate {}", path.display()))?;
    file.sync_all()?;
    Ok(())
}

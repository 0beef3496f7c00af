//! Durable per-direction wrap queue.
//!
//! Two append-only files back each queue:
//! - `<name>.log` holds `"<sourceTxId> <JSON payload>\r\n"` entries in arrival order
//! - `<name>.ack` holds the ids of entries whose destination submission succeeded
//!
//! Enqueue and acknowledge are single synced appends, so a crash at any point
//! leaves either the old or the new state. Once every entry is acknowledged
//! both files are truncated, entries first. When only parked (dead-lettered)
//! entries remain, the entry log is atomically rewritten to hold just those
//! lines before the acknowledgement log is cleared.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use tracing::{debug, warn};

use super::{
    append_line, format_line, parse_line, read_complete_lines, truncate, write_atomic, LINE_END,
};
use crate::intent::WrapPayload;

/// One queued wrap intent.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub source_tx_id: String,
    pub payload: WrapPayload,
}

/// FIFO of pending wrap intents for one direction.
pub struct TransferQueue {
    entries_path: PathBuf,
    acks_path: PathBuf,
    guard: Mutex<()>,
}

impl TransferQueue {
    /// Opens (or creates) the queue stored at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let entries_path = path.into();
        let acks_path = entries_path.with_extension("ack");
        let queue = Self {
            entries_path,
            acks_path,
            guard: Mutex::new(()),
        };

        // Finish a compaction interrupted between the two truncations.
        if read_complete_lines(&queue.entries_path)?.is_empty() {
            truncate(&queue.entries_path)?;
            truncate(&queue.acks_path)?;
        }
        Ok(queue)
    }

    pub fn path(&self) -> &Path {
        &self.entries_path
    }

    /// Appends an entry unless an entry with the same id is already stored.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The entry was appended
    /// * `Ok(false)` - Duplicate id, nothing written
    pub fn enqueue(&self, entry: &QueueEntry) -> Result<bool> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        if self
            .read_entries()?
            .iter()
            .any(|e| e.source_tx_id == entry.source_tx_id)
        {
            debug!(
                "Skipping duplicate queue entry {} in {}",
                entry.source_tx_id,
                self.entries_path.display()
            );
            return Ok(false);
        }

        let line = format_line(&entry.source_tx_id, &entry.payload)?;
        append_line(&self.entries_path, &line)?;
        Ok(true)
    }

    /// Entries not yet acknowledged, oldest first.
    pub fn pending(&self) -> Result<Vec<QueueEntry>> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.pending_unlocked()
    }

    /// The oldest unacknowledged entry.
    pub fn head(&self) -> Result<Option<QueueEntry>> {
        Ok(self.pending()?.into_iter().next())
    }

    /// The oldest unacknowledged entry whose id is not in `skip`.
    pub fn next_excluding(&self, skip: &HashSet<String>) -> Result<Option<QueueEntry>> {
        Ok(self
            .pending()?
            .into_iter()
            .find(|e| !skip.contains(&e.source_tx_id)))
    }

    /// Whether `tx_id` is still waiting for acknowledgement.
    pub fn contains_pending(&self, tx_id: &str) -> Result<bool> {
        Ok(self.pending()?.iter().any(|e| e.source_tx_id == tx_id))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Acknowledges a processed entry; compacts the files when none remain.
    ///
    /// # Returns
    ///
    /// * `Ok(false)` - No pending entry had this id
    pub fn ack(&self, tx_id: &str) -> Result<bool> {
        self.ack_with_parked(tx_id, &HashSet::new())
    }

    /// Acknowledges a processed entry, treating the ids in `parked` as
    /// settled for compaction.
    ///
    /// When every remaining entry is parked the entry log is rewritten to
    /// those entries alone and the acknowledgement log is cleared, so a
    /// dead-lettered entry does not pin every acknowledged line behind it.
    pub fn ack_with_parked(&self, tx_id: &str, parked: &HashSet<String>) -> Result<bool> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);

        let pending = self.pending_unlocked()?;
        if !pending.iter().any(|e| e.source_tx_id == tx_id) {
            return Ok(false);
        }

        append_line(&self.acks_path, tx_id)?;

        let remaining: HashSet<&str> = pending
            .iter()
            .map(|e| e.source_tx_id.as_str())
            .filter(|id| *id != tx_id)
            .collect();
        if remaining.is_empty() {
            truncate(&self.entries_path)?;
            truncate(&self.acks_path)?;
            debug!("Queue {} drained and compacted", self.entries_path.display());
        } else if remaining.iter().all(|id| parked.contains(*id)) {
            self.rewrite_entries(&remaining)?;
            truncate(&self.acks_path)?;
            debug!(
                "Queue {} compacted around {} parked entries",
                self.entries_path.display(),
                remaining.len()
            );
        }
        Ok(true)
    }

    /// Keeps only the raw lines whose id is in `keep`.
    fn rewrite_entries(&self, keep: &HashSet<&str>) -> Result<()> {
        let mut contents = String::new();
        for line in read_complete_lines(&self.entries_path)? {
            let id = line.split(' ').next().unwrap_or_default();
            if keep.contains(id) {
                contents.push_str(&line);
                contents.push_str(LINE_END);
            }
        }
        write_atomic(&self.entries_path, &contents)
    }

    fn read_entries(&self) -> Result<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        for line in read_complete_lines(&self.entries_path)? {
            match parse_line::<WrapPayload>(&line) {
                Ok((source_tx_id, payload)) => entries.push(QueueEntry {
                    source_tx_id,
                    payload,
                }),
                Err(e) => warn!(
                    "Skipping unreadable line in {}: {:#}",
                    self.entries_path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }

    fn pending_unlocked(&self) -> Result<Vec<QueueEntry>> {
        let acked: HashSet<String> = read_complete_lines(&self.acks_path)?.into_iter().collect();
        Ok(self
            .read_entries()?
            .into_iter()
            .filter(|e| !acked.contains(&e.source_tx_id))
            .collect())
    }
}

//! Dead-letter records.
//!
//! Append-only `"<sourceTxId> <JSON payload>\r\n"` lines for intents whose
//! relay failed. Nothing here is replayed automatically; a wrap entry whose id
//! is recorded here is skipped by its executor until an operator removes the
//! record.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use super::{append_line, format_line, parse_line, read_complete_lines};

/// One failed intent.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    pub source_tx_id: String,
    pub payload: serde_json::Value,
}

/// Per-direction dead-letter file.
pub struct DeadLetterStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl DeadLetterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append<T: Serialize>(&self, tx_id: &str, payload: &T) -> Result<()> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let line = format_line(tx_id, payload)?;
        append_line(&self.path, &line)
    }

    pub fn records(&self) -> Result<Vec<DeadLetterRecord>> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = Vec::new();
        for line in read_complete_lines(&self.path)? {
            match parse_line::<serde_json::Value>(&line) {
                Ok((source_tx_id, payload)) => records.push(DeadLetterRecord {
                    source_tx_id,
                    payload,
                }),
                Err(e) => warn!("Skipping unreadable line in {}: {:#}", self.path.display(), e),
            }
        }
        Ok(records)
    }

    pub fn tx_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .records()?
            .into_iter()
            .map(|r| r.source_tx_id)
            .collect())
    }

    pub fn contains(&self, tx_id: &str) -> Result<bool> {
        Ok(self.records()?.iter().any(|r| r.source_tx_id == tx_id))
    }
}

//! Block checkpoints.
//!
//! One file per watcher holding the last fully processed source block as a
//! decimal integer. Writes go through temp file + rename and never lower the
//! stored value.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::write_atomic;

/// Persisted last-processed block of one watcher.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the stored block.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The file is missing or empty
    /// * `Ok(Some(block))` - The stored block number
    /// * `Err(anyhow::Error)` - The file holds something other than an integer
    pub fn get(&self) -> Result<Option<u64>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("Corrupt checkpoint in {}: '{}'", self.path.display(), trimmed))
    }

    /// Returns the stored block, seeding it from `seed` (the current chain head)
    /// when nothing is stored yet.
    pub async fn load_or_seed<F, Fut>(&self, seed: F) -> Result<u64>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64>>,
    {
        if let Some(block) = self.get()? {
            return Ok(block);
        }

        let head = seed().await.context("Failed to fetch chain head for checkpoint seed")?;
        write_atomic(&self.path, &head.to_string())?;
        info!("Seeded checkpoint {} at block {}", self.path.display(), head);
        Ok(head)
    }

    /// Moves the checkpoint forward to `block`.
    ///
    /// Lower or equal values leave the file untouched.
    ///
    /// # Returns
    ///
    /// * `Ok(u64)` - The stored value after the call
    pub fn advance(&self, block: u64) -> Result<u64> {
        match self.get()? {
            Some(current) if current >= block => Ok(current),
            _ => {
                write_atomic(&self.path, &block.to_string())?;
                debug!("Checkpoint {} advanced to {}", self.path.display(), block);
                Ok(block)
            }
        }
    }
}

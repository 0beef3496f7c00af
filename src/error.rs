//! Relay error taxonomy.
//!
//! Chain clients and storage return `anyhow::Result`; the relay engine maps
//! those failures onto [`RelayError`] so each job can decide whether an
//! intent is dead-lettered, left at the head of its queue, or dropped.

use thiserror::Error;

/// Failure classes of one relay attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// RPC/HTTP failure or timeout before anything was submitted.
    #[error("Network error: {0}")]
    Network(String),

    /// The oracle address is not in the destination contract's oracle set.
    #[error("Oracle {oracle} is not registered on {contract}")]
    Unauthorized { oracle: String, contract: String },

    /// Malformed destination address or chain code mismatch.
    #[error("Invalid intent {tx_id}: {reason}")]
    Validation { tx_id: String, reason: String },

    /// Reverted transaction, missing receipt, build or signing failure.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// No usable gas price or other missing settings.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Persisted state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RelayError {
    /// Wraps an `anyhow` error raised while talking to a chain before submission.
    pub fn network(error: anyhow::Error) -> Self {
        Self::Network(format!("{:#}", error))
    }

    /// Wraps an `anyhow` error raised while building, signing or submitting.
    pub fn submission(error: anyhow::Error) -> Self {
        Self::Submission(format!("{:#}", error))
    }

    /// Wraps an `anyhow` error raised by persisted state.
    pub fn storage(error: anyhow::Error) -> Self {
        Self::Storage(format!("{:#}", error))
    }

    /// Returns true when the intent must be written to the dead-letter store.
    pub fn is_dead_letter(&self) -> bool {
        matches!(
            self,
            Self::Submission(_) | Self::Configuration(_) | Self::Validation { .. }
        )
    }
}

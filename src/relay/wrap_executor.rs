//! Wrap executor.
//!
//! One executor per wrap direction drains its durable queue in FIFO order,
//! one EVM submission at a time. A run ends when the queue has nothing left
//! to process or on the first failure; the failed entry either becomes a
//! dead letter (and is skipped by later runs) or stays at the head for the
//! next trigger.
//!
//! The submission itself happens under the chain's
//! [`SubmissionPermit`](crate::relay::SubmissionPermit):
//! after reserving it the executor re-checks that it still owns its slot and
//! that the entry is still pending, and acknowledges the entry before the
//! permit is released. A run whose slot was reclaimed therefore never sends
//! a transaction the new holder already sent.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::evm_abi::{encode_wrap_domain, encode_wrap_tokens, is_valid_address};
use crate::intent::Direction;
use crate::relay::evm_submitter::{ContractCall, EvmTransactionSubmitter};
use crate::relay::lock::{ExecutionLocks, JobKey, LockGuard};
use crate::storage::{DeadLetterStore, ErrorContext, OracleLogs, QueueEntry, TransferQueue};

/// How a drain run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another run holds this direction's slot.
    Busy,
    /// Nothing processable is left.
    Drained { processed: usize },
    /// The run stopped on a failed entry.
    Halted { source_tx_id: String, error: RelayError },
    /// The slot was reclaimed by another run while this one was stalled.
    Preempted,
}

/// Result of one entry that did not fail.
enum Step {
    Confirmed,
    /// Another run acknowledged the entry first.
    AlreadyAcked,
    LostSlot,
}

/// Queue worker for one wrap direction.
pub struct WrapExecutor {
    direction: Direction,
    contract: String,
    submitter: Arc<EvmTransactionSubmitter>,
    queue: Arc<TransferQueue>,
    dead_letters: Arc<DeadLetterStore>,
    locks: Arc<ExecutionLocks>,
    logs: OracleLogs,
}

impl WrapExecutor {
    /// Creates an executor.
    ///
    /// # Arguments
    ///
    /// * `direction` - A wrap direction
    /// * `contract` - Destination wrap contract address
    /// * `submitter` - Submitter for the direction's EVM chain
    /// * `queue` - Durable queue fed by the FIO watcher
    /// * `dead_letters` - Dead-letter store of the direction
    /// * `locks` - Shared execution slots
    /// * `logs` - Audit log sink
    pub fn new(
        direction: Direction,
        contract: String,
        submitter: Arc<EvmTransactionSubmitter>,
        queue: Arc<TransferQueue>,
        dead_letters: Arc<DeadLetterStore>,
        locks: Arc<ExecutionLocks>,
        logs: OracleLogs,
    ) -> Self {
        Self {
            direction,
            contract,
            submitter,
            queue,
            dead_letters,
            locks,
            logs,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    pub fn dead_letters(&self) -> &Arc<DeadLetterStore> {
        &self.dead_letters
    }

    pub fn submitter(&self) -> &Arc<EvmTransactionSubmitter> {
        &self.submitter
    }

    /// Starts a drain run in the background unless one is already executing.
    ///
    /// # Returns
    ///
    /// * `Some(JoinHandle)` - A new run was spawned
    /// * `None` - The direction is already executing
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<DrainOutcome>> {
        if self.locks.is_executing(JobKey::Executor(self.direction)) {
            debug!("{} executor already running", self.direction);
            return None;
        }
        let executor = Arc::clone(self);
        Some(tokio::spawn(async move { executor.drain().await }))
    }

    /// Processes queued entries until none is left or one fails.
    pub async fn drain(&self) -> DrainOutcome {
        let key = JobKey::Executor(self.direction);
        let guard = match self.locks.try_acquire(key) {
            Some(guard) => guard,
            None => return DrainOutcome::Busy,
        };

        if let Some(stalled) = guard.reclaimed_after() {
            self.logs.record_error(
                &self.error_context("Execution lock reclaimed"),
                &format!("previous run made no progress for {}s", stalled.as_secs()),
            );
        }

        let mut processed = 0;
        loop {
            if !guard.refresh() {
                warn!("{} executor lost its slot, stopping", self.direction);
                return DrainOutcome::Preempted;
            }

            let (entry, parked) = match self.next_entry() {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(error) => {
                    self.logs
                        .record_error(&self.error_context("Reading queue"), &error);
                    return DrainOutcome::Halted {
                        source_tx_id: String::new(),
                        error,
                    };
                }
            };

            match self.process(&guard, &entry, &parked).await {
                Ok(Step::Confirmed) => processed += 1,
                Ok(Step::AlreadyAcked) => continue,
                Ok(Step::LostSlot) => {
                    warn!(
                        "{} executor lost its slot before submitting {}, stopping",
                        self.direction, entry.source_tx_id
                    );
                    return DrainOutcome::Preempted;
                }
                Err(error) => {
                    self.fail(&entry, &error);
                    return DrainOutcome::Halted {
                        source_tx_id: entry.source_tx_id,
                        error,
                    };
                }
            }
        }

        if processed > 0 {
            info!("{} executor drained {} entries", self.direction, processed);
        }
        DrainOutcome::Drained { processed }
    }

    /// The next entry to relay and the dead-lettered ids it skipped over.
    fn next_entry(&self) -> Result<Option<(QueueEntry, HashSet<String>)>, RelayError> {
        let parked = self.dead_letters.tx_ids().map_err(RelayError::storage)?;
        let next = self
            .queue
            .next_excluding(&parked)
            .map_err(RelayError::storage)?;
        Ok(next.map(|entry| (entry, parked)))
    }

    /// Relays one entry: gas price, oracle registration, validation, submission.
    ///
    /// The slot and the entry are re-checked once the submission permit is
    /// held, and the acknowledgement is written before it is released.
    async fn process(
        &self,
        guard: &LockGuard,
        entry: &QueueEntry,
        parked: &HashSet<String>,
    ) -> Result<Step, RelayError> {
        info!(
            "{} executing {} to {}",
            self.direction, entry.source_tx_id, entry.payload.public_address
        );

        let gas_price = self.submitter.resolve_gas_price().await?;
        self.submitter.ensure_oracle_registered(&self.contract).await?;
        let call = self.build_call(entry)?;

        let permit = self.submitter.reserve().await;
        if !guard.refresh() {
            return Ok(Step::LostSlot);
        }
        let still_pending = self
            .queue
            .contains_pending(&entry.source_tx_id)
            .map_err(RelayError::storage)?;
        if !still_pending {
            debug!(
                "{} {} was acknowledged by another run",
                self.direction, entry.source_tx_id
            );
            return Ok(Step::AlreadyAcked);
        }

        let receipt = self.submitter.submit(&permit, &call, gas_price).await?;
        info!(
            "{} {} confirmed in {}",
            self.direction, entry.source_tx_id, receipt.transaction_hash
        );

        self.queue
            .ack_with_parked(&entry.source_tx_id, parked)
            .map_err(RelayError::storage)?;
        drop(permit);
        Ok(Step::Confirmed)
    }

    /// Validates the payload and encodes the wrap call.
    fn build_call(&self, entry: &QueueEntry) -> Result<ContractCall, RelayError> {
        let payload = &entry.payload;
        let invalid = |reason: String| RelayError::Validation {
            tx_id: entry.source_tx_id.clone(),
            reason,
        };

        if !is_valid_address(&payload.public_address) {
            return Err(invalid(format!(
                "'{}' is not a valid EVM address",
                payload.public_address
            )));
        }
        let expected_code = self.submitter.chain_code();
        if payload.chain_code != expected_code {
            return Err(invalid(format!(
                "chain code '{}' does not match {}",
                payload.chain_code, expected_code
            )));
        }

        let encoded = if self.direction.is_domain() {
            let domain = payload
                .fio_domain
                .as_deref()
                .filter(|d| !d.is_empty())
                .ok_or_else(|| invalid("missing fio_domain".to_string()))?;
            encode_wrap_domain(&payload.public_address, domain, &entry.source_tx_id)
        } else {
            let amount = payload
                .amount
                .ok_or_else(|| invalid("missing amount".to_string()))?;
            encode_wrap_tokens(&payload.public_address, amount, &entry.source_tx_id)
        };
        let calldata = encoded.map_err(|e| invalid(format!("{:#}", e)))?;

        Ok(ContractCall {
            contract: self.contract.clone(),
            calldata,
            label: format!(
                "{} {}",
                self.direction.evm_contract_label(),
                self.direction.fio_action()
            ),
            obt_id: entry.source_tx_id.clone(),
        })
    }

    fn fail(&self, entry: &QueueEntry, error: &RelayError) {
        if error.is_dead_letter() {
            if let Err(e) = self.dead_letters.append(&entry.source_tx_id, &entry.payload) {
                self.logs.record_error(
                    &self.error_context(&format!("Dead-lettering {}", entry.source_tx_id)),
                    &format!("{:#}", e),
                );
            }
        }
        self.logs.record_error(
            &self.error_context(&format!("Relaying {}", entry.source_tx_id)),
            error,
        );
    }

    fn error_context(&self, context: &str) -> ErrorContext {
        ErrorContext::new(
            self.direction.evm_chain(),
            self.direction.evm_contract_label(),
            self.direction.fio_action(),
            context,
        )
    }
}

//! EVM unwrap watcher.
//!
//! Scans one wrap contract for `unwrapped` events in bounded block ranges and
//! relays every event straight to FIO. Unwraps have no queue: a failed push
//! is written to the direction's error record for audit and not retried.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::evm_abi::{
    decode_unwrapped_domain, decode_unwrapped_tokens, event_topic, UNWRAPPED_DOMAIN_EVENT,
    UNWRAPPED_TOKENS_EVENT,
};
use crate::evm_client::{parse_hex_u64, EvmClient, EvmLog};
use crate::intent::{Direction, IntentPayload, TransferIntent};
use crate::relay::fio_submitter::{FioUnwrapSubmitter, UnwrapAction};
use crate::relay::lock::LockGuard;
use crate::storage::{CheckpointStore, DeadLetterStore, ErrorContext, OracleLogs};

/// Watcher of `unwrapped` events for one unwrap direction.
pub struct EvmUnwrapWatcher {
    direction: Direction,
    client: EvmClient,
    contract: String,
    range_limit: u64,
    checkpoint: CheckpointStore,
    submitter: Arc<FioUnwrapSubmitter>,
    dead_letters: Arc<DeadLetterStore>,
    logs: OracleLogs,
}

impl EvmUnwrapWatcher {
    /// Creates the watcher.
    ///
    /// # Arguments
    ///
    /// * `direction` - An unwrap direction
    /// * `client` - Client of the direction's EVM chain
    /// * `contract` - Wrap contract emitting `unwrapped`
    /// * `range_limit` - Maximum blocks per `eth_getLogs` request
    /// * `checkpoint` - Last fully relayed block
    /// * `submitter` - FIO unwrap submitter
    /// * `dead_letters` - Error record of the direction
    /// * `logs` - Audit log sink
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        direction: Direction,
        client: EvmClient,
        contract: String,
        range_limit: u64,
        checkpoint: CheckpointStore,
        submitter: Arc<FioUnwrapSubmitter>,
        dead_letters: Arc<DeadLetterStore>,
        logs: OracleLogs,
    ) -> Self {
        Self {
            direction,
            client,
            contract,
            range_limit: range_limit.max(1),
            checkpoint,
            submitter,
            dead_letters,
            logs,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    fn event_signature(&self) -> &'static str {
        if self.direction.is_domain() {
            UNWRAPPED_DOMAIN_EVENT
        } else {
            UNWRAPPED_TOKENS_EVENT
        }
    }

    /// Decodes the `unwrapped` events emitted in an inclusive block range.
    ///
    /// Logs whose data cannot be decoded are recorded in the error log and skipped.
    pub async fn discover_range(&self, from_block: u64, to_block: u64) -> Result<Vec<TransferIntent>> {
        let logs = self
            .client
            .get_logs(
                &self.contract,
                &event_topic(self.event_signature()),
                from_block,
                to_block,
            )
            .await?;

        let mut intents = Vec::with_capacity(logs.len());
        for log in logs {
            match self.decode(&log) {
                Ok(intent) => intents.push(intent),
                Err(e) => self.logs.record_error(
                    &self.error_context(&format!("Undecodable log {}", log.transaction_hash)),
                    &format!("{:#}", e),
                ),
            }
        }
        Ok(intents)
    }

    /// Relays every event between the checkpoint and the chain head.
    ///
    /// The checkpoint moves to the end of each range once all of its events
    /// have been handed to the FIO submitter.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of events found
    /// * `Err(anyhow::Error)` - Head, checkpoint or log query failure
    pub async fn poll(&self) -> Result<usize> {
        self.poll_inner(None).await
    }

    /// Like [`Self::poll`], but stops before any range once `guard` has been
    /// reclaimed by another run.
    pub async fn poll_holding(&self, guard: &LockGuard) -> Result<usize> {
        self.poll_inner(Some(guard)).await
    }

    async fn poll_inner(&self, guard: Option<&LockGuard>) -> Result<usize> {
        let head = self.client.get_block_number().await?;
        let last_block = self.checkpoint.load_or_seed(|| async move { Ok(head) }).await?;

        if last_block > head {
            anyhow::bail!(
                "Wrong start blockNumber for {}: stored {} is above chain head {}",
                self.direction,
                last_block,
                head
            );
        }

        let mut found = 0;
        let mut from_block = last_block + 1;
        while from_block <= head {
            if guard.is_some_and(|g| !g.refresh()) {
                anyhow::bail!(
                    "{} lost its execution slot at block {}",
                    self.direction,
                    from_block
                );
            }
            let to_block = head.min(from_block.saturating_add(self.range_limit - 1));
            debug!("{} scanning blocks {}..={}", self.direction, from_block, to_block);

            let intents = self
                .discover_range(from_block, to_block)
                .await
                .with_context(|| format!("{} log query failed", self.direction))?;
            found += intents.len();

            for intent in &intents {
                self.relay(intent).await;
            }

            self.checkpoint.advance(to_block)?;
            from_block = to_block + 1;
        }

        if found > 0 {
            info!("{} relayed {} events up to block {}", self.direction, found, head);
        }
        Ok(found)
    }

    async fn relay(&self, intent: &TransferIntent) {
        let action = match &intent.payload {
            IntentPayload::UnwrapTokens {
                fio_address,
                amount,
            } => UnwrapAction::Tokens {
                fio_address: fio_address.clone(),
                amount: *amount,
            },
            IntentPayload::UnwrapDomain {
                fio_address,
                domain,
            } => UnwrapAction::Domain {
                fio_address: fio_address.clone(),
                domain: domain.clone(),
            },
            IntentPayload::Wrap(_) => return,
        };

        self.logs.chain_text(
            self.direction.evm_chain(),
            &format!(
                "{} {} {} {}",
                self.direction.evm_chain(),
                self.direction.evm_contract_label(),
                self.direction.fio_action(),
                serde_json::json!({
                    "transactionHash": intent.source_tx_id,
                    "blockNumber": intent.discovered_at_block,
                    "payload": intent.payload,
                })
            ),
        );

        if let Err(error) = self
            .submitter
            .build_and_submit_unwrap(&intent.source_tx_id, &action)
            .await
        {
            if let Err(e) = self.dead_letters.append(&intent.source_tx_id, &intent.payload) {
                warn!(
                    "Failed to record unwrap error for {}: {:#}",
                    intent.source_tx_id, e
                );
            }
            self.logs.record_error(
                &self.error_context(&format!("Relaying {}", intent.source_tx_id)),
                &error,
            );
        }
    }

    fn decode(&self, log: &EvmLog) -> Result<TransferIntent> {
        let payload = if self.direction.is_domain() {
            let (fio_address, domain) = decode_unwrapped_domain(&log.data)?;
            IntentPayload::UnwrapDomain {
                fio_address,
                domain,
            }
        } else {
            let (fio_address, amount) = decode_unwrapped_tokens(&log.data)?;
            IntentPayload::UnwrapTokens {
                fio_address,
                amount,
            }
        };

        Ok(TransferIntent {
            source_tx_id: log.transaction_hash.clone(),
            direction: self.direction,
            payload,
            discovered_at_block: parse_hex_u64(&log.block_number)?,
        })
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

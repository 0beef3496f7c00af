//! FIO wrap watcher.
//!
//! Reads the oracle contract's action history, keeps actions above the stored
//! checkpoint, and hands each `wraptokens` / `wrapdomain` action to the durable
//! queue of its direction.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::fio_client::{FioClient, HistoryAction};
use crate::intent::{Chain, Direction, IntentPayload, TransferIntent, WrapPayload};
use crate::storage::{CheckpointStore, ErrorContext, OracleLogs, QueueEntry, TransferQueue};

/// Step by which the history window is widened while it does not reach the checkpoint.
const OFFSET_STEP: i64 = 10;

/// A history action above the checkpoint, classified when it is a wrap.
#[derive(Debug, Clone)]
pub struct DiscoveredAction {
    pub block_num: u64,
    pub raw: HistoryAction,
    /// `None` for actions that are not relayable wraps
    pub intent: Option<TransferIntent>,
}

/// Watcher of wrap actions on the FIO oracle contract.
pub struct FioWrapWatcher {
    client: FioClient,
    contract: String,
    poll_offset: i64,
    /// Configured chain code of every EVM chain, e.g. "ETH" -> Ethereum
    chain_codes: HashMap<String, Chain>,
    checkpoint: CheckpointStore,
    queues: HashMap<Direction, Arc<TransferQueue>>,
    logs: OracleLogs,
}

impl FioWrapWatcher {
    /// Creates the watcher.
    ///
    /// # Arguments
    ///
    /// * `client` - FIO chain/history client
    /// * `contract` - Oracle contract account whose history is read
    /// * `poll_offset` - Initial (negative) history window
    /// * `chain_codes` - Chain code to destination chain
    /// * `checkpoint` - Last fully enqueued FIO block
    /// * `queues` - Queues of the configured wrap directions
    /// * `logs` - Audit log sink
    pub fn new(
        client: FioClient,
        contract: String,
        poll_offset: i64,
        chain_codes: HashMap<String, Chain>,
        checkpoint: CheckpointStore,
        queues: HashMap<Direction, Arc<TransferQueue>>,
        logs: OracleLogs,
    ) -> Self {
        Self {
            client,
            contract,
            poll_offset,
            chain_codes,
            checkpoint,
            queues,
            logs,
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Lists actions above the checkpoint, oldest first.
    ///
    /// The history window starts at `poll_offset` and is widened until its
    /// oldest action is at or below the checkpoint, or until the history has
    /// no more actions to give.
    pub async fn discover(&self) -> Result<Vec<DiscoveredAction>> {
        let client = self.client.clone();
        let last_block = self
            .checkpoint
            .load_or_seed(|| async move {
                Ok(client.get_info().await?.last_irreversible_block_num)
            })
            .await?;

        let mut offset = self.poll_offset;
        let mut window = self.fetch_window(offset).await?;
        while window.first().is_some_and(|a| a.block_num > last_block) {
            offset -= OFFSET_STEP;
            let wider = self.fetch_window(offset).await?;
            if wider.len() <= window.len() {
                debug!("FIO history exhausted at offset {}", offset);
                window = wider;
                break;
            }
            window = wider;
        }

        let mut actions: Vec<DiscoveredAction> = window
            .into_iter()
            .filter(|a| a.block_num > last_block)
            .map(|raw| DiscoveredAction {
                block_num: raw.block_num,
                intent: self.classify(&raw),
                raw,
            })
            .collect();
        actions.sort_by_key(|a| a.block_num);

        debug!(
            "FIO history: {} actions above block {}",
            actions.len(),
            last_block
        );
        Ok(actions)
    }

    /// Discovers new wrap actions and enqueues them.
    ///
    /// The checkpoint advances block by block, after every intent of the block
    /// has been enqueued.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<Direction>)` - Directions that received at least one new entry
    pub async fn poll(&self) -> Result<Vec<Direction>> {
        let actions = self.discover().await?;
        let mut touched: Vec<Direction> = Vec::new();

        for (i, action) in actions.iter().enumerate() {
            if let Some(intent) = &action.intent {
                if self.enqueue(intent, &action.raw)? && !touched.contains(&intent.direction) {
                    touched.push(intent.direction);
                }
            }

            let block_complete = actions
                .get(i + 1)
                .map_or(true, |next| next.block_num != action.block_num);
            if block_complete {
                self.checkpoint.advance(action.block_num)?;
            }
        }

        if !touched.is_empty() {
            info!("FIO wrap watcher queued intents for {:?}", touched);
        }
        Ok(touched)
    }

    fn enqueue(&self, intent: &TransferIntent, raw: &HistoryAction) -> Result<bool> {
        let payload = match &intent.payload {
            IntentPayload::Wrap(payload) => payload.clone(),
            _ => return Ok(false),
        };

        let label = match intent.direction {
            Direction::WrapTokensEth => "wraptokens".to_string(),
            _ => format!("wrapdomain {}", payload.chain_code),
        };
        self.logs.chain_json(
            Chain::Fio,
            json!({
                "chain": Chain::Fio.code(),
                "contract": self.contract,
                "action": label,
                "transaction": raw,
            }),
        );

        let queue = match self.queues.get(&intent.direction) {
            Some(queue) => queue,
            None => {
                warn!(
                    "No queue configured for {}, skipping {}",
                    intent.direction, intent.source_tx_id
                );
                return Ok(false);
            }
        };

        queue
            .enqueue(&QueueEntry {
                source_tx_id: intent.source_tx_id.clone(),
                payload,
            })
            .with_context(|| format!("Failed to enqueue {}", intent.source_tx_id))
    }

    fn classify(&self, raw: &HistoryAction) -> Option<TransferIntent> {
        let act = &raw.action_trace.act;
        if act.account != self.contract {
            return None;
        }
        if act.name != "wraptokens" && act.name != "wrapdomain" {
            return None;
        }

        let payload: WrapPayload = match serde_json::from_value(act.data.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                self.logs.record_error(
                    &ErrorContext::new(
                        Chain::Fio,
                        self.contract.as_str(),
                        act.name.as_str(),
                        format!("Unreadable action data in {}", raw.action_trace.trx_id),
                    ),
                    &e,
                );
                return None;
            }
        };

        let destination = self.chain_codes.get(&payload.chain_code).copied();
        let direction = match Direction::classify_wrap(&act.name, destination) {
            Some(direction) => direction,
            None => {
                warn!(
                    "Unknown chain code '{}' in {} {}, skipping",
                    payload.chain_code, act.name, raw.action_trace.trx_id
                );
                return None;
            }
        };
        Some(TransferIntent {
            source_tx_id: raw.action_trace.trx_id.clone(),
            direction,
            payload: IntentPayload::Wrap(payload),
            discovered_at_block: raw.block_num,
        })
    }

    async fn fetch_window(&self, offset: i64) -> Result<Vec<HistoryAction>> {
        self.client
            .get_actions(&self.contract, -1, offset)
            .await
            .with_context(|| format!("Failed to read {} history", self.contract))
    }
}

//! FIO Transaction Builder/Submitter
//!
//! Builds `unwraptokens` / `unwrapdomain` actions on the oracle contract,
//! signs them with the oracle key and pushes them to the FIO chain API.
//! There is no retry here: a failed push is reported to the caller, which
//! records it for audit.

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::config::FioChainConfig;
use crate::crypto::FioSigner;
use crate::error::RelayError;
use crate::fio_abi::{signing_digest, AbiDefinition, Action, PermissionLevel, Transaction};
use crate::fio_client::{FioClient, PushResult};
use crate::intent::Chain;
use crate::storage::OracleLogs;

/// Permission the oracle account signs with.
const ORACLE_PERMISSION: &str = "active";

/// The unwrap the oracle confirms on FIO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwrapAction {
    Tokens { fio_address: String, amount: u64 },
    Domain { fio_address: String, domain: String },
}

impl UnwrapAction {
    pub fn action_name(&self) -> &'static str {
        match self {
            UnwrapAction::Tokens { .. } => "unwraptokens",
            UnwrapAction::Domain { .. } => "unwrapdomain",
        }
    }

    fn data(&self, obt_id: &str, actor: &str) -> serde_json::Value {
        match self {
            UnwrapAction::Tokens {
                fio_address,
                amount,
            } => json!({
                "fio_address": fio_address,
                "amount": amount,
                "obt_id": obt_id,
                "actor": actor,
            }),
            UnwrapAction::Domain {
                fio_address,
                domain,
            } => json!({
                "fio_address": fio_address,
                "fio_domain": domain,
                "obt_id": obt_id,
                "actor": actor,
            }),
        }
    }
}

/// Pushes oracle unwrap confirmations to FIO.
pub struct FioUnwrapSubmitter {
    client: FioClient,
    signer: FioSigner,
    contract: String,
    oracle_account: String,
    expiration_secs: u32,
    logs: OracleLogs,
}

impl FioUnwrapSubmitter {
    pub fn new(client: FioClient, signer: FioSigner, config: &FioChainConfig, logs: OracleLogs) -> Self {
        Self {
            client,
            signer,
            contract: config.oracle_contract.clone(),
            oracle_account: config.oracle_account.clone(),
            expiration_secs: config.expiration_secs,
            logs,
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Builds, signs and pushes one unwrap action.
    ///
    /// The node response, success or rejection, is written to the FIO log.
    ///
    /// # Arguments
    ///
    /// * `obt_id` - EVM transaction hash of the `unwrapped` event
    /// * `action` - What to unwrap and to whom
    ///
    /// # Returns
    ///
    /// * `Ok(PushResult)` - The node accepted the transaction
    /// * `Err(RelayError::Network)` - Reference block, ABI or chain id could not be read
    /// * `Err(RelayError::Submission)` - Build, signing or push failed, or the node rejected it
    pub async fn build_and_submit_unwrap(
        &self,
        obt_id: &str,
        action: &UnwrapAction,
    ) -> Result<PushResult, RelayError> {
        let action_name = action.action_name();

        let info = self.client.get_info().await.map_err(RelayError::network)?;
        let block = self
            .client
            .get_block(info.last_irreversible_block_num)
            .await
            .map_err(RelayError::network)?;
        let raw_abi = self
            .client
            .get_raw_abi(&self.contract)
            .await
            .map_err(RelayError::network)?;

        let abi = AbiDefinition::from_base64(&raw_abi.abi)
            .with_context(|| format!("Failed to parse ABI of {}", self.contract))
            .map_err(RelayError::submission)?;
        let data = abi
            .serialize_action_data(action_name, &action.data(obt_id, &self.oracle_account))
            .map_err(RelayError::submission)?;

        let transaction = Transaction {
            expiration: expiration_from_now(self.expiration_secs)?,
            ref_block_num: (block.block_num & 0xffff) as u16,
            ref_block_prefix: block.ref_block_prefix,
            actions: vec![Action {
                account: self.contract.clone(),
                name: action_name.to_string(),
                authorization: vec![PermissionLevel {
                    actor: self.oracle_account.clone(),
                    permission: ORACLE_PERMISSION.to_string(),
                }],
                data,
            }],
        };

        let packed = transaction.pack().map_err(RelayError::submission)?;
        let digest = signing_digest(&info.chain_id, &packed).map_err(RelayError::submission)?;
        let signature = self
            .signer
            .sign_digest(&digest)
            .map_err(RelayError::submission)?;

        let result = self
            .client
            .push_transaction(&signature, &packed)
            .await
            .map_err(RelayError::submission)?;

        self.logs.chain_json(
            Chain::Fio,
            json!({
                "chain": Chain::Fio.code(),
                "contract": self.contract,
                "action": action_name,
                "transaction": result.body,
            }),
        );

        if result.is_error() {
            warn!(
                "FIO {} for obt_id {} rejected (HTTP {}): {}",
                action_name, obt_id, result.http_status, result.body
            );
            return Err(RelayError::Submission(format!(
                "FIO rejected {} for {} (HTTP {}): {}",
                action_name, obt_id, result.http_status, result.body
            )));
        }

        info!(
            "FIO {} pushed for obt_id {}: {}",
            action_name,
            obt_id,
            result.transaction_id().unwrap_or("<no transaction id>")
        );
        Ok(result)
    }
}

fn expiration_from_now(secs: u32) -> Result<u32, RelayError> {
    let now = chrono::Utc::now().timestamp();
    u32::try_from(now + i64::from(secs))
        .map_err(|_| RelayError::Submission(format!("Expiration {} is out of range", now)))
}

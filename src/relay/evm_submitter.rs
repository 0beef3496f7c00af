//! EVM Transaction Builder/Submitter
//!
//! Builds, signs and broadcasts contract calls from the oracle key on one EVM
//! chain, then waits for the receipt.
//!
//! ## Nonces
//!
//! The nonce is read from the chain right before signing. Submissions on one
//! chain are serialized through a [`SubmissionPermit`]: a caller reserves the
//! permit, re-checks that its work is still wanted, submits, and records the
//! outcome before releasing it. Two wrap directions sharing the oracle key
//! therefore never sign with the same pending nonce.

use std::time::Duration;

use anyhow::Context;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::config::{EvmChainConfig, OracleConfig};
use crate::crypto::EvmSigner;
use crate::error::RelayError;
use crate::evm_abi::{parse_address, LegacyTransaction};
use crate::evm_client::{EvmClient, TransactionReceipt};
use crate::gas::GasPriceResolver;
use crate::intent::Chain;
use crate::storage::{ErrorContext, OracleLogs};

/// Balance must cover this many transactions at the current gas price.
const BALANCE_WARNING_MULTIPLIER: u128 = 5;

/// A contract call ready to be signed.
#[derive(Debug, Clone)]
pub struct ContractCall {
    /// Destination contract address
    pub contract: String,
    /// ABI-encoded calldata
    pub calldata: Vec<u8>,
    /// Audit label, e.g. "fio.erc20 wraptokens"
    pub label: String,
    /// Source transaction id the call relays
    pub obt_id: String,
}

/// Exclusive right to submit on one chain. Held from the pre-submit re-check
/// until the outcome is recorded.
pub struct SubmissionPermit<'a> {
    _slot: MutexGuard<'a, ()>,
}

/// Submits oracle transactions on one EVM chain.
pub struct EvmTransactionSubmitter {
    chain: Chain,
    chain_id: u64,
    chain_code: String,
    gas_limit: u64,
    client: EvmClient,
    signer: EvmSigner,
    gas: GasPriceResolver,
    logs: OracleLogs,
    receipt_poll_interval: Duration,
    submission_timeout: Duration,
    in_flight: Mutex<()>,
}

impl EvmTransactionSubmitter {
    /// Creates a submitter for one chain.
    ///
    /// # Arguments
    ///
    /// * `chain` - Ethereum or Polygon
    /// * `config` - Chain settings (RPC, chain id, gas policy)
    /// * `signer` - Oracle key on this chain
    /// * `logs` - Audit log sink
    /// * `oracle` - Receipt polling and submission deadline settings
    pub fn new(
        chain: Chain,
        config: &EvmChainConfig,
        signer: EvmSigner,
        logs: OracleLogs,
        oracle: &OracleConfig,
    ) -> anyhow::Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        let gas = GasPriceResolver::new(config, client.clone())?;

        Ok(Self {
            chain,
            chain_id: config.chain_id,
            chain_code: config.chain_code.clone(),
            gas_limit: config.gas_limit,
            client,
            signer,
            gas,
            logs,
            receipt_poll_interval: Duration::from_millis(oracle.receipt_poll_interval_ms),
            submission_timeout: Duration::from_millis(oracle.submission_timeout_ms),
            in_flight: Mutex::new(()),
        })
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// FIO chain code wrap requests use to name this chain, e.g. "ETH".
    pub fn chain_code(&self) -> &str {
        &self.chain_code
    }

    pub fn oracle_address(&self) -> String {
        self.signer.address()
    }

    pub fn client(&self) -> &EvmClient {
        &self.client
    }

    pub async fn resolve_gas_price(&self) -> Result<u128, RelayError> {
        self.gas.resolve().await
    }

    /// Checks that the oracle address is in the contract's `getOracles()` set.
    ///
    /// # Returns
    ///
    /// * `Err(RelayError::Unauthorized)` - The address is not registered
    /// * `Err(RelayError::Network)` - The registry could not be read
    pub async fn ensure_oracle_registered(&self, contract: &str) -> Result<(), RelayError> {
        let oracles = self
            .client
            .get_oracles(contract)
            .await
            .map_err(RelayError::network)?;
        let address = self.oracle_address();

        if oracles.iter().any(|o| o.eq_ignore_ascii_case(&address)) {
            Ok(())
        } else {
            Err(RelayError::Unauthorized {
                oracle: address,
                contract: contract.to_string(),
            })
        }
    }

    /// Warns in the error log when the oracle cannot pay for a few more transactions.
    ///
    /// Runs in the background and never affects the current submission.
    pub fn spawn_balance_check(&self, gas_price: u128) {
        let client = self.client.clone();
        let logs = self.logs.clone();
        let address = self.oracle_address();
        let chain = self.chain;
        let threshold = BALANCE_WARNING_MULTIPLIER
            .saturating_mul(self.gas_limit as u128)
            .saturating_mul(gas_price);

        tokio::spawn(async move {
            match client.get_balance(&address).await {
                Ok(balance) if balance < threshold => logs.record_error(
                    &ErrorContext::new(chain, address.as_str(), "balance", "Low oracle balance"),
                    &format!("balance {} wei is below {} wei", balance, threshold),
                ),
                Ok(balance) => debug!("{} oracle balance {} wei", chain, balance),
                Err(e) => warn!("Failed to read {} oracle balance: {:#}", chain, e),
            }
        });
    }

    /// Waits until no other submission is in flight on this chain.
    pub async fn reserve(&self) -> SubmissionPermit<'_> {
        SubmissionPermit {
            _slot: self.in_flight.lock().await,
        }
    }

    /// Signs and broadcasts `call`, then waits for a successful receipt.
    ///
    /// The whole sequence runs under the submission deadline. The caller
    /// proves exclusivity with a permit from [`Self::reserve`].
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionReceipt)` - Mined with status 0x1
    /// * `Err(RelayError::Submission)` - Any failure, revert or deadline expiry
    pub async fn submit(
        &self,
        _permit: &SubmissionPermit<'_>,
        call: &ContractCall,
        gas_price: u128,
    ) -> Result<TransactionReceipt, RelayError> {
        self.spawn_balance_check(gas_price);

        match tokio::time::timeout(self.submission_timeout, self.submit_inner(call, gas_price)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Submission(format!(
                "no receipt for {} within {}s",
                call.obt_id,
                self.submission_timeout.as_secs()
            ))),
        }
    }

    async fn submit_inner(
        &self,
        call: &ContractCall,
        gas_price: u128,
    ) -> Result<TransactionReceipt, RelayError> {
        let from = self.oracle_address();
        let to = parse_address(&call.contract).map_err(RelayError::submission)?;
        let nonce = self
            .client
            .get_transaction_count(&from)
            .await
            .map_err(RelayError::submission)?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: self.gas_limit,
            to,
            data: call.calldata.clone(),
            chain_id: self.chain_id,
        };
        let (r, s, recovery_id) = self
            .signer
            .sign_transaction_hash(&tx.signing_hash())
            .context("Failed to sign EVM transaction")
            .map_err(RelayError::submission)?;
        let raw_tx = tx.encode_signed(&r, &s, recovery_id);

        self.logs.chain_text(
            self.chain,
            &format!(
                "{} {} submit {}",
                self.chain,
                call.label,
                serde_json::json!({
                    "obtId": call.obt_id,
                    "from": from,
                    "to": call.contract,
                    "nonce": nonce,
                    "gasPrice": gas_price.to_string(),
                    "gasLimit": self.gas_limit,
                })
            ),
        );

        let tx_hash = self
            .client
            .send_raw_transaction(&raw_tx)
            .await
            .map_err(RelayError::submission)?;
        info!(
            "{} {} transaction sent: obt_id={}, nonce={}, tx_hash={}",
            self.chain, call.label, call.obt_id, nonce, tx_hash
        );
        self.logs.chain_text(
            self.chain,
            &format!("{} {} transactionHash {}", self.chain, call.label, tx_hash),
        );

        let receipt = self.wait_for_receipt(&tx_hash).await;
        self.logs.chain_text(
            self.chain,
            &format!(
                "{} {} receipt {}",
                self.chain,
                call.label,
                serde_json::to_string(&receipt).unwrap_or_default()
            ),
        );

        if !receipt.is_success() {
            return Err(RelayError::Submission(format!(
                "transaction {} for {} reverted (status {:?}); out of gas, already approved by this oracle, or nonce conflict",
                tx_hash, call.obt_id, receipt.status
            )));
        }
        Ok(receipt)
    }

    /// Polls until a receipt shows up. Poll errors are retried; the caller's
    /// deadline bounds the wait.
    async fn wait_for_receipt(&self, tx_hash: &str) -> TransactionReceipt {
        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return receipt,
                Ok(None) => debug!("Receipt for {} not available yet", tx_hash),
                Err(e) => warn!("Receipt poll for {} failed: {:#}", tx_hash, e),
            }
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

//! EVM Client Module
//!
//! This module provides a client for communicating with EVM-compatible blockchain nodes
//! via their JSON-RPC API. It covers event polling, oracle registry reads, balances,
//! nonces and raw transaction submission for the wrap/unwrap contracts.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::evm_abi::{decode_address_array, function_selector, GET_ORACLES_SIGNATURE};

/// Per-request timeout for JSON-RPC calls.
const RPC_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// EVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// EVM JSON-RPC response wrapper
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// EVM event log entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvmLog {
    /// Address of the contract that emitted the event
    pub address: String,
    /// Array of topics (indexed event parameters)
    pub topics: Vec<String>,
    /// Event data (non-indexed parameters)
    pub data: String,
    /// Block number (JSON-RPC uses camelCase: blockNumber)
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    /// Transaction hash (JSON-RPC uses camelCase: transactionHash)
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    /// Log index (JSON-RPC uses camelCase: logIndex)
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
}

/// Transaction receipt fields the relay inspects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransactionReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(rename = "gasUsed", default)]
    pub gas_used: Option<String>,
    /// "0x1" on success, "0x0" on revert
    #[serde(default)]
    pub status: Option<String>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

// ============================================================================
// EVM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for communicating with EVM-compatible blockchain nodes via JSON-RPC
#[derive(Clone)]
pub struct EvmClient {
    /// HTTP client for making requests
    client: Client,
    /// URL of the EVM node
    rpc_url: String,
}

impl EvmClient {
    /// Creates a new EVM client for the given node URL
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - URL of the EVM node (e.g., "http://127.0.0.1:8545")
    ///
    /// # Returns
    ///
    /// * `Ok(EvmClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(rpc_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Generic JSON-RPC call returning `None` when the node answers `null`.
    async fn json_rpc_optional<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        let rpc_future = async {
            let resp = self
                .client
                .post(&self.rpc_url)
                .json(&request)
                .send()
                .await
                .with_context(|| format!("Failed to send {} request to {}", method, self.rpc_url))?;
            resp.json::<JsonRpcResponse<T>>()
                .await
                .with_context(|| format!("Failed to parse {} response from {}", method, self.rpc_url))
        };

        let response = tokio::time::timeout(RPC_TIMEOUT, rpc_future)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "Timed out after {}s waiting for {} from {}",
                    RPC_TIMEOUT.as_secs(),
                    method,
                    self.rpc_url
                )
            })??;

        if let Some(error) = response.error {
            anyhow::bail!(
                "JSON-RPC error from {} ({}): {} (code: {})",
                self.rpc_url,
                method,
                error.message,
                error.code
            );
        }

        Ok(response.result)
    }

    /// Generic JSON-RPC call helper; a missing result is an error.
    async fn json_rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        self.json_rpc_optional(method, params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in {} response", method))
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> Result<u64> {
        let block_hex: String = self
            .json_rpc("eth_blockNumber", vec![])
            .await
            .context("eth_blockNumber failed")?;
        parse_hex_u64(&block_hex).context("Failed to parse block number")
    }

    /// Get the native balance of an address in wei.
    pub async fn get_balance(&self, address: &str) -> Result<u128> {
        let balance_hex: String = self
            .json_rpc(
                "eth_getBalance",
                vec![serde_json::json!(address), serde_json::json!("latest")],
            )
            .await
            .context("eth_getBalance failed")?;
        parse_hex_u128(&balance_hex).context("Failed to parse balance")
    }

    /// Get the next nonce of an address, counting pending transactions.
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64> {
        let nonce_hex: String = self
            .json_rpc(
                "eth_getTransactionCount",
                vec![serde_json::json!(address), serde_json::json!("pending")],
            )
            .await
            .context("eth_getTransactionCount failed")?;
        parse_hex_u64(&nonce_hex).context("Failed to parse nonce")
    }

    /// Get the node's gas price suggestion in wei.
    pub async fn get_gas_price(&self) -> Result<u128> {
        let price_hex: String = self
            .json_rpc("eth_gasPrice", vec![])
            .await
            .context("eth_gasPrice failed")?;
        parse_hex_u128(&price_hex).context("Failed to parse gas price")
    }

    /// Query logs of one contract and one event topic over an inclusive block range.
    ///
    /// # Arguments
    ///
    /// * `contract` - Address of the emitting contract
    /// * `topic0` - keccak256 of the event signature
    /// * `from_block` / `to_block` - Inclusive block range
    pub async fn get_logs(
        &self,
        contract: &str,
        topic0: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EvmLog>> {
        let filter = serde_json::json!({
            "address": contract,
            "topics": [topic0],
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
        });

        self.json_rpc("eth_getLogs", vec![filter])
            .await
            .with_context(|| format!("eth_getLogs failed for blocks {}..={}", from_block, to_block))
    }

    /// Read-only contract call returning the raw hex result.
    pub async fn call(&self, to: &str, data: &[u8]) -> Result<String> {
        self.json_rpc(
            "eth_call",
            vec![
                serde_json::json!({
                    "to": to,
                    "data": format!("0x{}", hex::encode(data)),
                }),
                serde_json::json!("latest"),
            ],
        )
        .await
        .with_context(|| format!("eth_call to {} failed", to))
    }

    /// Reads the registered oracle set of a wrap contract via `getOracles()`.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Lowercase `0x` addresses
    pub async fn get_oracles(&self, contract: &str) -> Result<Vec<String>> {
        let result = self
            .call(contract, &function_selector(GET_ORACLES_SIGNATURE))
            .await?;
        decode_address_array(&result).context("Failed to decode getOracles() result")
    }

    /// Broadcast a signed raw transaction, returning its hash.
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<String> {
        self.json_rpc(
            "eth_sendRawTransaction",
            vec![serde_json::json!(format!("0x{}", hex::encode(raw_tx)))],
        )
        .await
        .context("eth_sendRawTransaction failed")
    }

    /// Get a transaction receipt; `None` while the transaction is not mined.
    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        self.json_rpc_optional("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await
            .context("eth_getTransactionReceipt failed")
    }
}

// ============================================================================
// HEX QUANTITY HELPERS
// ============================================================================

/// Parses a `0x` hex quantity into u64.
pub fn parse_hex_u64(value: &str) -> Result<u64> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    if clean.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(clean, 16).with_context(|| format!("Invalid hex quantity '{}'", value))
}

/// Parses a `0x` hex quantity into u128.
pub fn parse_hex_u128(value: &str) -> Result<u128> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    if clean.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(clean, 16).with_context(|| format!("Invalid hex quantity '{}'", value))
}

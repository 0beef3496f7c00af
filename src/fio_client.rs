//! FIO Client Module
//!
//! HTTP client for the FIO chain API (`/v1/chain/*`) and the history API
//! (`/v1/history/get_actions`).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// Response of `get_info`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainInfo {
    pub chain_id: String,
    pub head_block_num: u64,
    pub last_irreversible_block_num: u64,
}

/// Response of `get_block` (only the TAPOS fields).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockInfo {
    pub block_num: u64,
    pub ref_block_prefix: u32,
}

/// Response of `get_raw_abi`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAbi {
    pub account_name: String,
    /// Base64 encoded binary ABI
    pub abi: String,
}

/// Response of `get_actions`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionsResponse {
    #[serde(default)]
    pub actions: Vec<HistoryAction>,
}

/// One entry of the history API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryAction {
    pub block_num: u64,
    pub action_trace: ActionTrace,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionTrace {
    pub trx_id: String,
    pub act: ActionData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionData {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outcome of `push_transaction`: the node answers with a JSON body either way.
#[derive(Debug, Clone)]
pub struct PushResult {
    pub http_status: u16,
    pub body: serde_json::Value,
}

impl PushResult {
    /// True when the node rejected the transaction.
    pub fn is_error(&self) -> bool {
        !(200..300).contains(&self.http_status)
            || self.body.get("error").is_some()
            || self.body.get("type").is_some()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.body.get("transaction_id").and_then(|v| v.as_str())
    }
}

// ============================================================================
// FIO CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the FIO chain and history HTTP APIs
#[derive(Clone)]
pub struct FioClient {
    client: Client,
    api_url: String,
    history_url: String,
}

impl FioClient {
    /// Creates a new FIO client
    ///
    /// # Arguments
    ///
    /// * `api_url` - Base URL of the chain API
    /// * `history_url` - Base URL of the history API
    pub fn new(api_url: &str, history_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            history_url: history_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} returned HTTP {}: {}", url, status, text);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Current chain id and irreversible block.
    pub async fn get_info(&self) -> Result<ChainInfo> {
        self.post_json(
            format!("{}/v1/chain/get_info", self.api_url),
            serde_json::json!({}),
        )
        .await
    }

    /// Block header fields used as transaction reference.
    pub async fn get_block(&self, block_num: u64) -> Result<BlockInfo> {
        self.post_json(
            format!("{}/v1/chain/get_block", self.api_url),
            serde_json::json!({ "block_num_or_id": block_num }),
        )
        .await
    }

    /// Binary ABI of a contract account.
    pub async fn get_raw_abi(&self, account: &str) -> Result<RawAbi> {
        self.post_json(
            format!("{}/v1/chain/get_raw_abi", self.api_url),
            serde_json::json!({ "account_name": account }),
        )
        .await
    }

    /// Pushes a signed, packed transaction.
    ///
    /// Rejections come back as JSON bodies too, so the body is returned for
    /// logging instead of being turned into an error here.
    pub async fn push_transaction(&self, signature: &str, packed_trx: &[u8]) -> Result<PushResult> {
        let url = format!("{}/v1/chain/push_transaction", self.api_url);
        let body = serde_json::json!({
            "signatures": [signature],
            "compression": 0,
            "packed_context_free_data": "",
            "packed_trx": hex::encode(packed_trx),
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        let http_status = response.status().as_u16();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response from {}", url))?;
        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        Ok(PushResult { http_status, body })
    }

    /// History window of an account's actions.
    ///
    /// # Arguments
    ///
    /// * `account` - Account whose actions are listed
    /// * `pos` - Position to start from (-1 for the newest)
    /// * `offset` - Window size, negative to look backwards from `pos`
    pub async fn get_actions(&self, account: &str, pos: i64, offset: i64) -> Result<Vec<HistoryAction>> {
        let response: ActionsResponse = self
            .post_json(
                format!("{}/v1/history/get_actions", self.history_url),
                serde_json::json!({
                    "account_name": account,
                    "pos": pos,
                    "offset": offset,
                }),
            )
            .await?;
        Ok(response.actions)
    }
}

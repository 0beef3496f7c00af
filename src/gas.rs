//! Gas price resolution for EVM submissions.
//!
//! A live source (Etherscan-style fee API or the node's `eth_gasPrice`) is
//! preferred when configured; the static price from configuration is the
//! fallback. A resolved price of zero is a configuration error.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::{EvmChainConfig, GasOracleConfig, GasPriceLevel};
use crate::error::RelayError;
use crate::evm_client::EvmClient;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Chooses the gas price of the next transaction on one chain.
pub struct GasPriceResolver {
    http: Client,
    evm: EvmClient,
    oracle: Option<GasOracleConfig>,
    level: GasPriceLevel,
    static_price_wei: u128,
}

impl GasPriceResolver {
    /// Builds a resolver for a chain.
    ///
    /// # Returns
    ///
    /// * `Err(anyhow::Error)` - The static gas price is not a decimal gwei value
    pub fn new(chain: &EvmChainConfig, evm: EvmClient) -> Result<Self> {
        let static_price_wei = gwei_to_wei(&chain.gas_price_gwei)
            .with_context(|| format!("Invalid gas_price_gwei for {}", chain.name))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            evm,
            oracle: chain.gas_oracle.clone(),
            level: chain.gas_price_level,
            static_price_wei,
        })
    }

    /// Resolves the gas price in wei.
    ///
    /// # Returns
    ///
    /// * `Ok(u128)` - Live tier price, or the static price when the live source is unavailable
    /// * `Err(RelayError::Configuration)` - Neither source yields a positive price
    pub async fn resolve(&self) -> Result<u128, RelayError> {
        let live = match &self.oracle {
            Some(GasOracleConfig::FeeApi { url }) => match self.fetch_fee_api(url).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("Gas fee API request failed, using static gas price: {:#}", e);
                    None
                }
            },
            Some(GasOracleConfig::Node) => match self.evm.get_gas_price().await {
                Ok(base) => Some(apply_level(base, self.level)),
                Err(e) => {
                    warn!("eth_gasPrice failed, using static gas price: {:#}", e);
                    None
                }
            },
            None => None,
        };

        let price = live.filter(|p| *p > 0).unwrap_or(self.static_price_wei);
        debug!("Resolved gas price: {} wei (live: {:?})", price, live);

        if price == 0 {
            return Err(RelayError::Configuration(
                "no usable gas price: live source unavailable and static gas price is zero".to_string(),
            ));
        }
        Ok(price)
    }

    /// Queries an Etherscan-style gas tracker.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(wei))` - Status "1" and the requested tier parsed
    /// * `Ok(None)` - The API reported itself unavailable (status other than "1")
    async fn fetch_fee_api(&self, url: &str) -> Result<Option<u128>> {
        let body: serde_json::Value = self
            .http
            .get(url)
            .send()
            .await
            .context("Failed to reach gas fee API")?
            .json()
            .await
            .context("Failed to parse gas fee API response")?;

        if body.get("status").and_then(|s| s.as_str()) != Some("1") {
            debug!("Gas fee API unavailable: {}", body);
            return Ok(None);
        }

        let field = match self.level {
            GasPriceLevel::Low => "SafeGasPrice",
            GasPriceLevel::Average => "ProposeGasPrice",
            GasPriceLevel::High => "FastGasPrice",
        };
        let tier = body
            .get("result")
            .and_then(|r| r.get(field))
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Gas fee API response has no {}", field))?;

        gwei_to_wei(tier).map(Some)
    }
}

/// Derives a tier from a node suggestion: low +0%, average +10%, high +20%, rounded up.
pub fn apply_level(base_wei: u128, level: GasPriceLevel) -> u128 {
    let percent = match level {
        GasPriceLevel::Low => 100,
        GasPriceLevel::Average => 110,
        GasPriceLevel::High => 120,
    };
    // Saturates on absurd node replies.
    match base_wei.checked_mul(percent) {
        Some(scaled) => scaled.div_ceil(100),
        None => u128::MAX,
    }
}

/// Converts a decimal gwei string ("25", "25.5", "0.000000001") into wei.
pub fn gwei_to_wei(gwei: &str) -> Result<u128> {
    let gwei = gwei.trim();
    let (whole, fraction) = gwei.split_once('.').unwrap_or((gwei, ""));
    if whole.is_empty() && fraction.is_empty() {
        anyhow::bail!("Empty gas price");
    }
    if fraction.len() > 9 {
        anyhow::bail!("Gas price '{}' has more than 9 decimals", gwei);
    }

    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .with_context(|| format!("Invalid gas price '{}'", gwei))?
            .checked_mul(WEI_PER_GWEI)
            .ok_or_else(|| anyhow::anyhow!("Gas price '{}' overflows", gwei))?
    };
    let fraction_wei = if fraction.is_empty() {
        0
    } else {
        format!("{:0<9}", fraction)
            .parse::<u128>()
            .with_context(|| format!("Invalid gas price '{}'", gwei))?
    };

    Ok(whole_wei + fraction_wei)
}

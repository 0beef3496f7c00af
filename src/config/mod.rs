//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the FIO oracle.
//! Configuration includes chain endpoints, contract addresses, gas settings,
//! polling cadence and the names of the environment variables holding keys.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all oracle settings.
///
/// This structure holds configuration for:
/// - Oracle runtime settings (log directory, intervals, timeouts)
/// - FIO chain connection details and oracle account
/// - Ethereum chain connection details, contracts and gas policy
/// - Polygon chain connection details (optional, for domain wraps to Polygon)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Oracle runtime settings
    pub oracle: OracleConfig,
    /// FIO chain configuration (source of wraps, destination of unwraps)
    pub fio: FioChainConfig,
    /// Ethereum chain configuration (wrapped FIO token and wrapped domains)
    pub ethereum: EvmChainConfig,
    /// Polygon chain configuration (optional, wrapped domains only)
    #[serde(default)]
    pub polygon: Option<EvmChainConfig>,
}

/// Runtime settings shared by every job of the oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Directory holding checkpoints, queues, dead letters and audit logs
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Interval between FIO wrap discovery cycles in milliseconds
    #[serde(default = "default_polling_interval_ms")]
    pub wrap_polling_interval_ms: u64,
    /// Interval between EVM unwrap discovery cycles in milliseconds
    #[serde(default = "default_polling_interval_ms")]
    pub unwrap_polling_interval_ms: u64,
    /// Interval between wrap executor ticks in milliseconds
    #[serde(default = "default_polling_interval_ms")]
    pub executor_interval_ms: u64,
    /// Deadline for one destination submission (send and receipt) in milliseconds
    #[serde(default = "default_submission_timeout_ms")]
    pub submission_timeout_ms: u64,
    /// Age after which a held execution lock is reclaimed, in milliseconds.
    /// Must exceed `submission_timeout_ms` plus [`LOCK_TTL_HEADROOM_MS`]; 0 disables reclaiming.
    #[serde(default = "default_lock_ttl_ms")]
    pub lock_ttl_ms: u64,
    /// Delay between receipt polls in milliseconds
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_polling_interval_ms() -> u64 {
    60_000
}

fn default_submission_timeout_ms() -> u64 {
    300_000
}

fn default_lock_ttl_ms() -> u64 {
    900_000
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

/// Time a lock holder may spend on gas and registry calls around one submission.
pub const LOCK_TTL_HEADROOM_MS: u64 = 30_000;

/// Configuration for the FIO chain connection.
///
/// Keys are loaded from environment variables at runtime for security.
/// The config file contains the environment variable names, not the actual keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FioChainConfig {
    /// Human-readable name for the chain
    pub name: String,
    /// Base URL of the chain API (`/v1/chain/*`)
    pub api_url: String,
    /// Base URL of the history API (`/v1/history/*`)
    pub history_url: String,
    /// Oracle account name used as actor on unwrap actions
    pub oracle_account: String,
    /// Contract account emitting wrap actions and receiving unwrap actions
    #[serde(default = "default_oracle_contract")]
    pub oracle_contract: String,
    /// Environment variable name containing the oracle private key (WIF or PVT_K1)
    /// Default: "FIO_ORACLE_PRIVATE_KEY"
    #[serde(default = "default_fio_private_key_env")]
    pub private_key_env: String,
    /// Initial history window offset, negative (relative to the newest action)
    #[serde(default = "default_poll_offset")]
    pub poll_offset: i64,
    /// Transaction expiration in seconds from now
    #[serde(default = "default_expiration_secs")]
    pub expiration_secs: u32,
}

fn default_oracle_contract() -> String {
    "fio.oracle".to_string()
}

fn default_fio_private_key_env() -> String {
    "FIO_ORACLE_PRIVATE_KEY".to_string()
}

fn default_poll_offset() -> i64 {
    -10
}

fn default_expiration_secs() -> u32 {
    10
}

impl FioChainConfig {
    /// Loads the FIO private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (WIF or PVT_K1 encoded)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the FIO oracle private key.",
                self.private_key_env
            )
        })
    }
}

/// Configuration for an EVM-compatible chain (Ethereum, Polygon).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmChainConfig {
    /// Human-readable name for the chain
    pub name: String,
    /// Chain code carried by FIO wrap actions targeting this chain ("ETH", "MATIC")
    pub chain_code: String,
    /// RPC endpoint URL for EVM chain communication
    pub rpc_url: String,
    /// Chain ID used for EIP-155 signing (e.g., 1 for Ethereum mainnet, 137 for Polygon)
    pub chain_id: u64,
    /// Address of the wrapped FIO token contract (optional, Ethereum only)
    #[serde(default)]
    pub token_contract_addr: Option<String>,
    /// Address of the wrapped FIO domain contract (optional)
    #[serde(default)]
    pub nft_contract_addr: Option<String>,
    /// Environment variable name containing the oracle ECDSA private key (hex)
    pub private_key_env: String,
    /// Static gas limit for every oracle transaction
    pub gas_limit: u64,
    /// Static gas price in gwei, used when no gas oracle answers
    #[serde(default = "default_gas_price_gwei")]
    pub gas_price_gwei: String,
    /// Tier picked from the gas oracle
    #[serde(default)]
    pub gas_price_level: GasPriceLevel,
    /// Live gas price source (optional)
    #[serde(default)]
    pub gas_oracle: Option<GasOracleConfig>,
    /// Maximum number of blocks requested per `eth_getLogs` call
    #[serde(default = "default_blocks_range_limit")]
    pub blocks_range_limit: u64,
}

fn default_gas_price_gwei() -> String {
    "0".to_string()
}

fn default_blocks_range_limit() -> u64 {
    1_000
}

impl EvmChainConfig {
    /// Loads the ECDSA private key from the environment variable.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The private key (hex encoded, optional 0x prefix)
    /// * `Err(anyhow::Error)` - Failed to load from environment
    pub fn get_private_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.private_key_env).map_err(|_| {
            anyhow::anyhow!(
                "Environment variable '{}' not set. Please set it with the {} oracle private key (hex encoded).",
                self.private_key_env,
                self.name
            )
        })
    }
}

/// Gas price tier requested from a gas oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceLevel {
    Low,
    #[default]
    Average,
    High,
}

/// Live gas price source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GasOracleConfig {
    /// Etherscan-style gas tracker returning `{status, result: {SafeGasPrice, ProposeGasPrice, FastGasPrice}}`
    FeeApi { url: String },
    /// Node suggestion via `eth_gasPrice`, tiers derived as +0%, +10%, +20%
    Node,
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates the configuration.
    ///
    /// This function ensures that:
    /// - Ethereum and Polygon chain IDs differ
    /// - Every endpoint URL parses
    /// - Polling intervals, gas limits and block range limits are positive
    /// - A lock TTL outlasts a full submission plus headroom
    /// - Chain codes are set and differ between chains
    /// - The Ethereum token contract is configured
    /// - The FIO history offset is negative
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - Invalid configuration detected
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut urls = vec![
            ("fio.api_url", self.fio.api_url.as_str()),
            ("fio.history_url", self.fio.history_url.as_str()),
            ("ethereum.rpc_url", self.ethereum.rpc_url.as_str()),
        ];
        if let Some(ref polygon) = self.polygon {
            urls.push(("polygon.rpc_url", polygon.rpc_url.as_str()));
        }
        for chain in self.evm_chains() {
            if let Some(GasOracleConfig::FeeApi { ref url }) = chain.gas_oracle {
                urls.push(("gas_oracle.url", url.as_str()));
            }
        }
        for (field, value) in urls {
            url::Url::parse(value).map_err(|e| {
                anyhow::anyhow!("Configuration error: {} '{}' is not a valid URL: {}", field, value, e)
            })?;
        }

        for (field, value) in [
            ("wrap_polling_interval_ms", self.oracle.wrap_polling_interval_ms),
            ("unwrap_polling_interval_ms", self.oracle.unwrap_polling_interval_ms),
            ("executor_interval_ms", self.oracle.executor_interval_ms),
            ("receipt_poll_interval_ms", self.oracle.receipt_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(anyhow::anyhow!(
                    "Configuration error: oracle.{} must be greater than zero",
                    field
                ));
            }
        }

        if self.oracle.submission_timeout_ms == 0 {
            return Err(anyhow::anyhow!(
                "Configuration error: oracle.submission_timeout_ms must be greater than zero"
            ));
        }
        let min_lock_ttl_ms = self
            .oracle
            .submission_timeout_ms
            .saturating_add(LOCK_TTL_HEADROOM_MS);
        if self.oracle.lock_ttl_ms != 0 && self.oracle.lock_ttl_ms <= min_lock_ttl_ms {
            return Err(anyhow::anyhow!(
                "Configuration error: oracle.lock_ttl_ms ({}) must exceed submission_timeout_ms plus {} ms ({}), or be 0 to disable reclaiming",
                self.oracle.lock_ttl_ms,
                LOCK_TTL_HEADROOM_MS,
                min_lock_ttl_ms
            ));
        }

        let mut chain_ids = HashSet::new();
        let mut chain_codes = HashSet::new();
        for chain in self.evm_chains() {
            if chain.chain_code.trim().is_empty() {
                return Err(anyhow::anyhow!(
                    "Configuration error: {} chain_code must not be empty",
                    chain.name
                ));
            }
            if !chain_codes.insert(chain.chain_code.as_str()) {
                return Err(anyhow::anyhow!(
                    "Configuration error: Ethereum and Polygon have the same chain code '{}'",
                    chain.chain_code
                ));
            }
            if !chain_ids.insert(chain.chain_id) {
                return Err(anyhow::anyhow!(
                    "Configuration error: Ethereum and Polygon have the same chain ID {}. Each chain must have a unique chain ID.",
                    chain.chain_id
                ));
            }
            if chain.gas_limit == 0 {
                return Err(anyhow::anyhow!(
                    "Configuration error: {} gas_limit must be greater than zero",
                    chain.name
                ));
            }
            if chain.blocks_range_limit == 0 {
                return Err(anyhow::anyhow!(
                    "Configuration error: {} blocks_range_limit must be greater than zero",
                    chain.name
                ));
            }
        }

        if self.ethereum.token_contract_addr.is_none() {
            return Err(anyhow::anyhow!(
                "Configuration error: ethereum.token_contract_addr is required"
            ));
        }

        if self.fio.poll_offset >= 0 {
            return Err(anyhow::anyhow!(
                "Configuration error: fio.poll_offset must be negative, got {}",
                self.fio.poll_offset
            ));
        }

        Ok(())
    }

    /// Returns the configured EVM chains, Ethereum first.
    pub fn evm_chains(&self) -> impl Iterator<Item = &EvmChainConfig> {
        std::iter::once(&self.ethereum).chain(self.polygon.iter())
    }

    /// Loads configuration from the TOML file.
    ///
    /// This function:
    /// 1. Reads the path from FIO_ORACLE_CONFIG_PATH (default config/fio-oracle.toml)
    /// 2. If it exists, loads, parses and validates the configuration
    /// 3. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Returns
    ///
    /// - `Ok(Config)` - Successfully loaded and validated configuration
    /// - `Err(anyhow::Error)` - Failed to load configuration, file doesn't exist, or validation failed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("FIO_ORACLE_CONFIG_PATH")
            .unwrap_or_else(|_| "config/fio-oracle.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::load_from(Path::new(&config_path))
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/fio-oracle.template.toml config/fio-oracle.toml\n\
                Then edit config/fio-oracle.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads and validates configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

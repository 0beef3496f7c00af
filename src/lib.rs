//! FIO Oracle Library
//!
//! Relay engine for the FIO bridge oracle. Watches the FIO chain for wrap
//! intents and the Ethereum/Polygon chains for unwrap events, and relays each
//! intent as a signed transaction on the opposite chain.
//!
//! Modules:
//! - `config` - TOML configuration and key loading
//! - `crypto` - secp256k1 signers for EVM and FIO transactions
//! - `evm_abi` / `evm_client` - EVM encoding helpers and JSON-RPC client
//! - `fio_abi` / `fio_client` - FIO binary serialization and HTTP API client
//! - `gas` - gas price resolution for EVM submissions
//! - `storage` - checkpoints, durable queues, dead letters and audit logs
//! - `relay` - execution locks, transaction submitters and wrap executors
//! - `monitor` - chain watchers discovering transfer intents
//! - `coordinator` - job scheduling across watchers and executors

pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod evm_abi;
pub mod evm_client;
pub mod fio_abi;
pub mod fio_client;
pub mod gas;
pub mod intent;
pub mod monitor;
pub mod relay;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::RelayCoordinator;
pub use error::RelayError;
pub use intent::{Chain, Direction, TransferIntent};

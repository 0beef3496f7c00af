//! FIO Oracle Service
//!
//! Bridge oracle relaying FIO wraps to Ethereum/Polygon and EVM unwraps back
//! to FIO. Every relayed intent is signed with this oracle's keys; the
//! destination contracts apply the multi-oracle consensus.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: This service holds the oracle keys of every chain it relays to.
//! Keys are read from environment variables only and must never be logged.

use std::sync::Arc;

use anyhow::Result;
use fio_oracle::{Config, RelayCoordinator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point that initializes and runs the oracle.
///
/// This function:
/// 1. Initializes logging and tracing
/// 2. Loads configuration from TOML file
/// 3. Builds watchers, executors and submitters
/// 4. Runs every job until Ctrl-C
#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, default info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting FIO Oracle Service");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("FIO Oracle Service");
        println!();
        println!("Usage: fio-oracle [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  FIO_ORACLE_CONFIG_PATH    Path to config file (default config/fio-oracle.toml)");
        println!("  RUST_LOG                  Log filter (default info)");
        println!("  Private keys are read from the variables named by private_key_env in the config");
        return Ok(());
    }

    let mut config_path = None;
    let mut i = 1; // Skip program name
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            config_path = Some(args[i + 1].clone());
            i += 1;
        }
        i += 1;
    }

    if let Some(path) = config_path {
        std::env::set_var("FIO_ORACLE_CONFIG_PATH", &path);
        info!("Using custom config: {}", path);
    }

    let config = Config::load()?;
    info!("Configuration loaded successfully");

    let coordinator = Arc::new(RelayCoordinator::from_config(&config)?);
    info!("Oracle initialized successfully");

    coordinator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

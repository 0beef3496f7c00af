//! Get Oracle Addresses
//!
//! Reads the oracle configuration and prints the address derived from each
//! configured key, for registering the oracle on the wrap contracts and on FIO.
//!
//! ## Usage
//!
//! ```bash
//! FIO_ORACLE_CONFIG_PATH=config/fio-oracle.toml \
//!   cargo run --bin get_oracle_addresses
//! ```

use anyhow::Result;
use fio_oracle::config::Config;
use fio_oracle::crypto::{EvmSigner, FioSigner};

fn main() -> Result<()> {
    let config = Config::load()?;

    println!("Oracle addresses derived from configured keys:");
    println!();

    for chain in config.evm_chains() {
        match chain.get_private_key().and_then(|key| EvmSigner::from_hex(&key)) {
            Ok(signer) => println!("{} ({}): {}", chain.name, chain.chain_code, signer.address()),
            Err(e) => println!("{} ({}): unavailable ({})", chain.name, chain.chain_code, e),
        }
    }

    match config
        .fio
        .get_private_key()
        .and_then(|key| FioSigner::from_key_string(&key))
    {
        Ok(signer) => println!("{} ({}): {}", config.fio.name, config.fio.oracle_account, signer.public_key()),
        Err(e) => println!("{}: unavailable ({})", config.fio.name, e),
    }

    println!();
    println!("Register the EVM addresses with the wrap contracts' oracle set before relaying.");

    Ok(())
}

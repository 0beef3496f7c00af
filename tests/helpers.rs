//! Shared test helpers for integration tests
//!
//! The module is organized into several categories:
//! - **Constants**: Dummy addresses, ids, keys and other test values
//! - **Configuration Builders**: Functions to create test configurations
//! - **Encoding Helpers**: ABI payloads the mock chains answer with
//! - **Mock Server Helpers**: JSON-RPC and FIO API responders for wiremock

#![allow(dead_code)]

use std::path::Path;

use fio_oracle::config::{
    Config, EvmChainConfig, FioChainConfig, GasPriceLevel, OracleConfig,
};
use fio_oracle::evm_abi::{encode_call, AbiToken};
use fio_oracle::fio_abi::ByteWriter;
use rand::Rng;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// --------------------------------- KEYS ---------------------------------

/// Well-known EVM test private key (hex)
pub const TEST_EVM_PRIVATE_KEY: &str =
    "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Address derived from TEST_EVM_PRIVATE_KEY (lowercase)
pub const TEST_EVM_ADDRESS: &str = "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23";

/// Well-known development WIF key
pub const TEST_FIO_WIF: &str = "5KQwrPbwdL6PhXujxW37FSSQZ1JiwsST4cqQzDeyXtP79zkvFD3";

/// Public key of TEST_FIO_WIF in FIO format
pub const TEST_FIO_PUBLIC_KEY: &str = "FIO6MRyAjQq8ud7hVNYcfnVPJqcVpscN5So8BhtHuGYqET5GDW5CV";

/// FIO chain id (64 hex characters)
pub const TEST_FIO_CHAIN_ID: &str =
    "b20901380af44ef59c5918439a1f9a41d83669020319a80574b804a5f95cbd7e";

// ------------------------- TOKENS AND CONTRACTS -------------------------

/// Dummy wrapped FIO token contract (EVM format, 20 bytes)
pub const DUMMY_TOKEN_CONTRACT_ETH: &str = "0x0000000000000000000000000000000000000010";

/// Dummy wrapped FIO domain contract on Ethereum
pub const DUMMY_NFT_CONTRACT_ETH: &str = "0x0000000000000000000000000000000000000011";

/// Dummy wrapped FIO domain contract on Polygon
pub const DUMMY_NFT_CONTRACT_POLYGON: &str = "0x0000000000000000000000000000000000000012";

/// Another registered oracle
pub const DUMMY_OTHER_ORACLE: &str = "0x00000000000000000000000000000000000000aa";

// -------------------------------- USERS ---------------------------------

/// Dummy destination address of wraps (all lowercase, valid)
pub const DUMMY_DESTINATION_EVM: &str = "0x00000000000000000000000000000000000abc01";

/// Dummy FIO handle receiving unwraps
pub const DUMMY_FIO_ADDRESS: &str = "alice@fiotestnet";

/// FIO oracle account
pub const DUMMY_ORACLE_ACCOUNT: &str = "qbxn5zhw2ypw";

// -------------------------------- OTHER ---------------------------------

/// Dummy EVM transaction hash (64 hex characters)
pub const DUMMY_TX_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000012";

/// Dummy FIO transaction id
pub const DUMMY_FIO_TX_ID: &str =
    "6f4c1f0ea6c1a1a1d4b0a1f8b5e8d3c2b1a0f9e8d7c6b5a4f3e2d1c0b9a8f7e6";

/// Test Ethereum chain id
pub const TEST_ETH_CHAIN_ID: u64 = 11155111;

/// Test Polygon chain id
pub const TEST_POLYGON_CHAIN_ID: u64 = 80002;

// ============================================================================
// CONFIGURATION BUILDERS
// ============================================================================

/// Sets a value under a unique environment variable name and returns the name.
/// Unique names avoid conflicts between tests running in parallel.
pub fn unique_env(prefix: &str, value: &str) -> String {
    let unique_id: u64 = rand::thread_rng().gen();
    let name = format!("{}_{}", prefix, unique_id);
    std::env::set_var(&name, value);
    name
}

/// Oracle runtime settings with short intervals for tests.
pub fn build_test_oracle_config(log_dir: &Path) -> OracleConfig {
    OracleConfig {
        log_dir: log_dir.to_path_buf(),
        wrap_polling_interval_ms: 1000,
        unwrap_polling_interval_ms: 1000,
        executor_interval_ms: 1000,
        submission_timeout_ms: 5000,
        lock_ttl_ms: 60_000,
        receipt_poll_interval_ms: 10,
    }
}

/// FIO settings pointing both APIs at `url`.
pub fn build_test_fio_config(url: &str) -> FioChainConfig {
    FioChainConfig {
        name: "FIO Test".to_string(),
        api_url: url.to_string(),
        history_url: url.to_string(),
        oracle_account: DUMMY_ORACLE_ACCOUNT.to_string(),
        oracle_contract: "fio.oracle".to_string(),
        private_key_env: unique_env("TEST_FIO_ORACLE_KEY", TEST_FIO_WIF),
        poll_offset: -10,
        expiration_secs: 10,
    }
}

/// Ethereum settings with a static 10 gwei gas price and no gas oracle.
pub fn build_test_eth_config(url: &str) -> EvmChainConfig {
    EvmChainConfig {
        name: "Ethereum Test".to_string(),
        chain_code: "ETH".to_string(),
        rpc_url: url.to_string(),
        chain_id: TEST_ETH_CHAIN_ID,
        token_contract_addr: Some(DUMMY_TOKEN_CONTRACT_ETH.to_string()),
        nft_contract_addr: Some(DUMMY_NFT_CONTRACT_ETH.to_string()),
        private_key_env: unique_env("TEST_ETH_ORACLE_KEY", TEST_EVM_PRIVATE_KEY),
        gas_limit: 400_000,
        gas_price_gwei: "10".to_string(),
        gas_price_level: GasPriceLevel::Average,
        gas_oracle: None,
        blocks_range_limit: 100,
    }
}

/// Polygon settings (domain contract only).
pub fn build_test_polygon_config(url: &str) -> EvmChainConfig {
    EvmChainConfig {
        name: "Polygon Test".to_string(),
        chain_code: "MATIC".to_string(),
        rpc_url: url.to_string(),
        chain_id: TEST_POLYGON_CHAIN_ID,
        token_contract_addr: None,
        nft_contract_addr: Some(DUMMY_NFT_CONTRACT_POLYGON.to_string()),
        private_key_env: unique_env("TEST_POLYGON_ORACLE_KEY", TEST_EVM_PRIVATE_KEY),
        gas_limit: 400_000,
        gas_price_gwei: "30".to_string(),
        gas_price_level: GasPriceLevel::High,
        gas_oracle: None,
        blocks_range_limit: 100,
    }
}

/// Full configuration without Polygon.
pub fn build_test_config(log_dir: &Path, fio_url: &str, eth_url: &str) -> Config {
    Config {
        oracle: build_test_oracle_config(log_dir),
        fio: build_test_fio_config(fio_url),
        ethereum: build_test_eth_config(eth_url),
        polygon: None,
    }
}

// ============================================================================
// ENCODING HELPERS
// ============================================================================

/// ABI-encodes an `address[]` return value as `eth_call` returns it.
pub fn encode_address_array(addresses: &[&str]) -> String {
    let mut out = String::from("0x");
    out.push_str(&format!("{:064x}", 32));
    out.push_str(&format!("{:064x}", addresses.len()));
    for addr in addresses {
        out.push_str(&format!("{:0>64}", addr.trim_start_matches("0x").to_lowercase()));
    }
    out
}

/// Log data of `unwrapped(string fioaddress, uint256 amount)`.
pub fn encode_unwrapped_tokens_data(fio_address: &str, amount: u64) -> String {
    let call = encode_call(
        "unwrapped(string,uint256)",
        &[
            AbiToken::String(fio_address.to_string()),
            AbiToken::Uint(amount as u128),
        ],
    );
    format!("0x{}", hex::encode(&call[4..]))
}

/// Log data of `unwrapped(string fioaddress, string domain)`.
pub fn encode_unwrapped_domain_data(fio_address: &str, domain: &str) -> String {
    let call = encode_call(
        "unwrapped(string,string)",
        &[
            AbiToken::String(fio_address.to_string()),
            AbiToken::String(domain.to_string()),
        ],
    );
    format!("0x{}", hex::encode(&call[4..]))
}

/// Binary ABI of a minimal `fio.oracle` contract with the two unwrap actions.
pub fn build_oracle_abi_bytes() -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.push_string("eosio::abi/1.1").unwrap();

    // types
    w.push_varuint32(1);
    w.push_string("fioaddress").unwrap();
    w.push_string("string").unwrap();

    // structs
    let structs: [(&str, &[(&str, &str)]); 2] = [
        (
            "unwraptokens",
            &[
                ("fio_address", "fioaddress"),
                ("amount", "int64"),
                ("obt_id", "string"),
                ("actor", "name"),
            ],
        ),
        (
            "unwrapdomain",
            &[
                ("fio_domain", "string"),
                ("obt_id", "string"),
                ("fio_address", "fioaddress"),
                ("actor", "name"),
            ],
        ),
    ];
    w.push_varuint32(structs.len() as u32);
    for (name, fields) in structs {
        w.push_string(name).unwrap();
        w.push_string("").unwrap();
        w.push_varuint32(fields.len() as u32);
        for (field, ty) in fields {
            w.push_string(field).unwrap();
            w.push_string(ty).unwrap();
        }
    }

    // actions
    w.push_varuint32(2);
    for name in ["unwraptokens", "unwrapdomain"] {
        w.push_name(name).unwrap();
        w.push_string(name).unwrap();
        w.push_string("").unwrap();
    }

    // trailing tables the parser does not read
    w.push_varuint32(0);
    w.push_varuint32(0);
    w.into_bytes()
}

/// Base64 form of [`build_oracle_abi_bytes`], as `get_raw_abi` returns it.
pub fn build_oracle_abi_base64() -> String {
    use base64::{engine::general_purpose, Engine as _};
    general_purpose::STANDARD.encode(build_oracle_abi_bytes())
}

/// A FIO history entry of the oracle contract.
pub fn history_action(block_num: u64, trx_id: &str, name: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "block_num": block_num,
        "action_trace": {
            "trx_id": trx_id,
            "act": {
                "account": "fio.oracle",
                "name": name,
                "data": data,
            }
        }
    })
}

/// An EVM log entry as returned by `eth_getLogs`.
pub fn evm_log(contract: &str, topic0: &str, data: &str, block: u64, tx_hash: &str) -> serde_json::Value {
    json!({
        "address": contract,
        "topics": [topic0],
        "data": data,
        "blockNumber": format!("0x{:x}", block),
        "transactionHash": tx_hash,
        "logIndex": "0x0",
    })
}

/// Reads the nonce of a signed legacy transaction (`0x` hex RLP).
pub fn raw_tx_nonce(raw_hex: &str) -> u64 {
    let raw = hex::decode(raw_hex.trim_start_matches("0x")).unwrap();
    let header = if raw[0] <= 0xf7 {
        1
    } else {
        1 + (raw[0] - 0xf7) as usize
    };
    match raw[header] {
        b @ 0x00..=0x7f => b as u64,
        0x80 => 0,
        b => {
            let len = (b - 0x80) as usize;
            raw[header + 1..header + 1 + len]
                .iter()
                .fold(0u64, |acc, x| (acc << 8) | *x as u64)
        }
    }
}

// ============================================================================
// MOCK SERVER HELPERS
// ============================================================================

/// JSON-RPC success body.
pub fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

/// Mounts a responder for one JSON-RPC method.
pub async fn mount_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

/// Mounts an EVM chain on which a wrap submission succeeds.
///
/// `getOracles()` lists the test oracle, the nonce is `nonce`, and every
/// transaction is mined with status 0x1.
pub async fn mount_successful_evm_chain(server: &MockServer, nonce: u64) {
    mount_rpc(
        server,
        "eth_call",
        json!(encode_address_array(&[DUMMY_OTHER_ORACLE, TEST_EVM_ADDRESS])),
    )
    .await;
    mount_rpc(server, "eth_getTransactionCount", json!(format!("0x{:x}", nonce))).await;
    mount_rpc(server, "eth_getBalance", json!("0xde0b6b3a7640000")).await;
    mount_rpc(server, "eth_sendRawTransaction", json!(DUMMY_TX_HASH)).await;
    mount_rpc(
        server,
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": DUMMY_TX_HASH,
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "status": "0x1",
        }),
    )
    .await;
}

/// Mounts the FIO chain endpoints used when pushing an unwrap.
pub async fn mount_fio_chain(server: &MockServer, head_block: u64) {
    use wiremock::matchers::path;

    Mock::given(method("POST"))
        .and(path("/v1/chain/get_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chain_id": TEST_FIO_CHAIN_ID,
            "head_block_num": head_block + 2,
            "last_irreversible_block_num": head_block,
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chain/get_block"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "block_num": head_block,
            "ref_block_prefix": 3_190_149_521u32,
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chain/get_raw_abi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_name": "fio.oracle",
            "abi": build_oracle_abi_base64(),
        })))
        .mount(server)
        .await;
}

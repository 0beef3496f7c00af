//! Unit tests for FIO binary serialization
//!
//! Covers name encoding, the binary ABI parser, ABI-driven action data and the
//! packed transaction envelope that gets signed.

use fio_oracle::fio_abi::{
    name_to_u64, signing_digest, u64_to_name, AbiDefinition, Action, ByteWriter,
    PermissionLevel, Transaction,
};
use serde_json::json;
use sha2::{Digest, Sha256};

#[path = "helpers.rs"]
mod helpers;
use helpers::{
    build_oracle_abi_base64, build_oracle_abi_bytes, DUMMY_FIO_ADDRESS, DUMMY_ORACLE_ACCOUNT,
    TEST_FIO_CHAIN_ID,
};

/// 1. Test: Name Encoding
/// Verifies account names against their known u64 values and back.
/// Why: Every account, action and permission in a packed transaction is a name.
#[test]
fn test_name_encoding() {
    assert_eq!(name_to_u64("eosio").unwrap(), 6138663577826885632);
    assert_eq!(name_to_u64("fio.oracle").unwrap(), 6604540247156621312);
    assert_eq!(name_to_u64("active").unwrap(), 3617214756542218240);

    for name in ["fio.oracle", DUMMY_ORACLE_ACCOUNT, "unwraptokens", "a"] {
        assert_eq!(u64_to_name(name_to_u64(name).unwrap()), name);
    }
}

/// 2. Test: Invalid Names Rejected
/// Verifies that characters outside `.a-z1-5` and overlong names are refused.
/// Why: A silently mangled name would push the action to a different account.
#[test]
fn test_invalid_names_rejected() {
    assert!(name_to_u64("Fio.oracle").is_err());
    assert!(name_to_u64("oracle6").is_err());
    assert!(name_to_u64("abcdefghijklmn").is_err());
    assert!(name_to_u64("abcdefghijklz").is_err(), "13th character above 'j'");
}

/// 3. Test: Variable Length Integers
/// Verifies LEB128 output of the writer.
/// Why: Lengths and counts across the whole transaction use this encoding.
#[test]
fn test_varuint32() {
    let mut w = ByteWriter::new();
    w.push_varuint32(0);
    w.push_varuint32(127);
    w.push_varuint32(128);
    w.push_varuint32(300);
    assert_eq!(w.into_bytes(), vec![0x00, 0x7f, 0x80, 0x01, 0xac, 0x02]);
}

/// 4. Test: Parse Binary ABI
/// Verifies that aliases, structs and actions are read from a binary ABI.
/// Why: Unwrap data is serialized from whatever ABI the chain currently serves.
#[test]
fn test_parse_binary_abi() {
    let abi = AbiDefinition::from_bytes(&build_oracle_abi_bytes()).unwrap();
    assert_eq!(abi.version, "eosio::abi/1.1");
    assert_eq!(abi.types["fioaddress"], "string");
    assert_eq!(abi.actions["unwraptokens"], "unwraptokens");
    assert_eq!(abi.structs["unwrapdomain"].fields.len(), 4);

    let from_base64 = AbiDefinition::from_base64(&build_oracle_abi_base64()).unwrap();
    assert_eq!(from_base64.actions, abi.actions);

    assert!(AbiDefinition::from_bytes(&[]).is_err());
}

/// 5. Test: Serialize Unwrap Tokens Data
/// Verifies the exact bytes of `unwraptokens` action data.
/// Why: The contract decodes these bytes by field order; any drift changes the recipient or amount.
#[test]
fn test_serialize_unwrap_tokens_data() {
    let abi = AbiDefinition::from_bytes(&build_oracle_abi_bytes()).unwrap();
    let data = abi
        .serialize_action_data(
            "unwraptokens",
            &json!({
                "fio_address": DUMMY_FIO_ADDRESS,
                "amount": 1_000_000_000u64,
                "obt_id": "0xabc",
                "actor": DUMMY_ORACLE_ACCOUNT,
            }),
        )
        .unwrap();

    let mut expected = vec![DUMMY_FIO_ADDRESS.len() as u8];
    expected.extend_from_slice(DUMMY_FIO_ADDRESS.as_bytes());
    expected.extend_from_slice(&1_000_000_000i64.to_le_bytes());
    expected.push(5);
    expected.extend_from_slice(b"0xabc");
    expected.extend_from_slice(&name_to_u64(DUMMY_ORACLE_ACCOUNT).unwrap().to_le_bytes());
    assert_eq!(data, expected);
}

/// 6. Test: Action Data Errors
/// Verifies that unknown actions and missing fields are reported.
/// Why: A partially serialized action must never be signed.
#[test]
fn test_action_data_errors() {
    let abi = AbiDefinition::from_bytes(&build_oracle_abi_bytes()).unwrap();

    let err = abi.serialize_action_data("regoracle", &json!({})).unwrap_err();
    assert!(err.to_string().contains("not found"));

    let err = abi
        .serialize_action_data(
            "unwrapdomain",
            &json!({"fio_address": DUMMY_FIO_ADDRESS, "obt_id": "0x1", "actor": DUMMY_ORACLE_ACCOUNT}),
        )
        .unwrap_err();
    assert!(format!("{:#}", err).contains("fio_domain"));
}

/// 7. Test: Packed Transaction Layout
/// Verifies header fields, action encoding and trailing extension count.
/// Why: The signed digest covers these exact bytes.
#[test]
fn test_packed_transaction_layout() {
    let tx = Transaction {
        expiration: 1_700_000_000,
        ref_block_num: 0x1234,
        ref_block_prefix: 3_190_149_521,
        actions: vec![Action {
            account: "fio.oracle".to_string(),
            name: "unwraptokens".to_string(),
            authorization: vec![PermissionLevel {
                actor: DUMMY_ORACLE_ACCOUNT.to_string(),
                permission: "active".to_string(),
            }],
            data: vec![0xaa, 0xbb],
        }],
    };
    let packed = tx.pack().unwrap();

    assert_eq!(&packed[0..4], &1_700_000_000u32.to_le_bytes());
    assert_eq!(&packed[4..6], &0x1234u16.to_le_bytes());
    assert_eq!(&packed[6..10], &3_190_149_521u32.to_le_bytes());
    assert_eq!(&packed[10..14], &[0, 0, 0, 0], "limits, delay and context free actions");
    assert_eq!(packed[14], 1, "one action");
    assert_eq!(&packed[15..23], &name_to_u64("fio.oracle").unwrap().to_le_bytes());
    assert_eq!(&packed[23..31], &name_to_u64("unwraptokens").unwrap().to_le_bytes());
    assert_eq!(packed[31], 1, "one authorization");
    assert_eq!(&packed[48..51], &[2, 0xaa, 0xbb]);
    assert_eq!(packed[51], 0, "no extensions");
    assert_eq!(packed.len(), 52);
}

/// 8. Test: Signing Digest
/// Verifies the digest is sha256(chain id || packed || 32 zero bytes).
/// Why: Nodes recover the signer from this digest; any other preimage yields an unknown key.
#[test]
fn test_signing_digest() {
    let packed = vec![1u8, 2, 3];
    let digest = signing_digest(TEST_FIO_CHAIN_ID, &packed).unwrap();

    let mut preimage = hex::decode(TEST_FIO_CHAIN_ID).unwrap();
    preimage.extend_from_slice(&packed);
    preimage.extend_from_slice(&[0u8; 32]);
    let expected: [u8; 32] = Sha256::digest(&preimage).into();
    assert_eq!(digest, expected);

    assert!(signing_digest("abcd", &packed).is_err());
    assert!(signing_digest("zz", &packed).is_err());
}

//! EVM encoding helpers
//!
//! Hand-rolled ABI and RLP encoding for the handful of calls and events the
//! oracle needs:
//! - `wrap(address,uint256,string)` on the wrapped FIO token contract
//! - `wrapnft(address,string,string)` on the wrapped domain contract
//! - `getOracles()` returning `address[]`
//! - `unwrapped(string,uint256)` / `unwrapped(string,string)` events
//! - legacy EIP-155 transaction envelopes

use anyhow::{Context, Result};
use sha3::{Digest, Keccak256};

pub const WRAP_TOKENS_SIGNATURE: &str = "wrap(address,uint256,string)";
pub const WRAP_DOMAIN_SIGNATURE: &str = "wrapnft(address,string,string)";
pub const GET_ORACLES_SIGNATURE: &str = "getOracles()";
pub const UNWRAPPED_TOKENS_EVENT: &str = "unwrapped(string,uint256)";
pub const UNWRAPPED_DOMAIN_EVENT: &str = "unwrapped(string,string)";

// ============================================================================
// ABI ENCODING
// ============================================================================

/// A single ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiToken {
    Address([u8; 20]),
    Uint(u128),
    String(String),
}

/// First four bytes of keccak256 over a function signature.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Compute keccak256 event topic hash for an event signature string.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

fn uint_word(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// ABI-encodes a call: selector, head words, then the dynamic tail.
///
/// Dynamic arguments get an offset word in the head, measured from the start
/// of the arguments, and a length-prefixed, right-padded body in the tail.
pub fn encode_call(signature: &str, tokens: &[AbiToken]) -> Vec<u8> {
    let mut head = Vec::with_capacity(tokens.len() * 32);
    let mut tail = Vec::new();
    let head_len = tokens.len() * 32;

    for token in tokens {
        match token {
            AbiToken::Address(addr) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(addr);
                head.extend_from_slice(&word);
            }
            AbiToken::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            AbiToken::String(value) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                let bytes = value.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let padding = (32 - (bytes.len() % 32)) % 32;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    let mut data = function_selector(signature).to_vec();
    data.extend(head);
    data.extend(tail);
    data
}

/// Calldata for `wrap(account, amount, obtId)`.
pub fn encode_wrap_tokens(account: &str, amount: u64, obt_id: &str) -> Result<Vec<u8>> {
    Ok(encode_call(
        WRAP_TOKENS_SIGNATURE,
        &[
            AbiToken::Address(parse_address(account)?),
            AbiToken::Uint(amount as u128),
            AbiToken::String(obt_id.to_string()),
        ],
    ))
}

/// Calldata for `wrapnft(account, domain, obtId)`.
pub fn encode_wrap_domain(account: &str, domain: &str, obt_id: &str) -> Result<Vec<u8>> {
    Ok(encode_call(
        WRAP_DOMAIN_SIGNATURE,
        &[
            AbiToken::Address(parse_address(account)?),
            AbiToken::String(domain.to_string()),
            AbiToken::String(obt_id.to_string()),
        ],
    ))
}

// ============================================================================
// ADDRESSES
// ============================================================================

/// Parses a `0x`-prefixed 20-byte hex address.
pub fn parse_address(addr: &str) -> Result<[u8; 20]> {
    let clean = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(clean).with_context(|| format!("Invalid EVM address '{}'", addr))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("EVM address must be 20 bytes, got {}", b.len()))
}

/// Checks address format the way wallets do: `0x` plus 40 hex chars, and if
/// the letters are mixed case they must match the EIP-55 checksum.
pub fn is_valid_address(addr: &str) -> bool {
    let Some(body) = addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X")) else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if all_lower || all_upper {
        return true;
    }
    to_checksum_address(body) == format!("0x{}", body)
}

/// EIP-55 mixed-case rendering of an address.
pub fn to_checksum_address(addr: &str) -> String {
    let lower = addr.strip_prefix("0x").unwrap_or(addr).to_lowercase();
    let hash = hex::encode(Keccak256::digest(lower.as_bytes()));
    let checksummed: String = lower
        .chars()
        .zip(hash.chars())
        .map(|(c, h)| {
            if c.is_ascii_alphabetic() && h.to_digit(16).unwrap_or(0) >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();
    format!("0x{}", checksummed)
}

// ============================================================================
// ABI DECODING
// ============================================================================

fn decode_hex_data(data: &str) -> Result<Vec<u8>> {
    hex::decode(data.strip_prefix("0x").unwrap_or(data)).context("ABI data is not valid hex")
}

fn word(data: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(32)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| anyhow::anyhow!("ABI data too short: need word at byte {}", offset))
}

fn word_as_usize(data: &[u8], offset: usize) -> Result<usize> {
    let w = word(data, offset)?;
    if w[..24].iter().any(|b| *b != 0) {
        anyhow::bail!("ABI word at byte {} does not fit in usize", offset);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&w[24..]);
    Ok(u64::from_be_bytes(buf) as usize)
}

fn word_as_u64(data: &[u8], offset: usize) -> Result<u64> {
    Ok(word_as_usize(data, offset)? as u64)
}

fn decode_string_at(data: &[u8], offset: usize) -> Result<String> {
    let len = word_as_usize(data, offset)?;
    let start = offset + 32;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| anyhow::anyhow!("ABI string at byte {} overruns data", offset))?;
    String::from_utf8(bytes.to_vec()).context("ABI string is not valid UTF-8")
}

/// Decodes the return data of a function returning `address[]`.
pub fn decode_address_array(data: &str) -> Result<Vec<String>> {
    let bytes = decode_hex_data(data)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let offset = word_as_usize(&bytes, 0)?;
    let count = word_as_usize(&bytes, offset)?;
    (0..count)
        .map(|i| {
            let w = word(&bytes, offset + 32 + i * 32)?;
            Ok(format!("0x{}", hex::encode(&w[12..])))
        })
        .collect()
}

/// Decodes `unwrapped(string fioaddress, uint256 amount)` log data.
pub fn decode_unwrapped_tokens(data: &str) -> Result<(String, u64)> {
    let bytes = decode_hex_data(data)?;
    let fio_address = decode_string_at(&bytes, word_as_usize(&bytes, 0)?)?;
    let amount = word_as_u64(&bytes, 32)?;
    Ok((fio_address, amount))
}

/// Decodes `unwrapped(string fioaddress, string domain)` log data.
pub fn decode_unwrapped_domain(data: &str) -> Result<(String, String)> {
    let bytes = decode_hex_data(data)?;
    let fio_address = decode_string_at(&bytes, word_as_usize(&bytes, 0)?)?;
    let domain = decode_string_at(&bytes, word_as_usize(&bytes, 32)?)?;
    Ok((fio_address, domain))
}

// ============================================================================
// LEGACY TRANSACTIONS
// ============================================================================

/// Unsigned legacy (pre-EIP-1559) contract call with zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_items(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_encode_uint(self.nonce as u128),
            rlp_encode_uint(self.gas_price),
            rlp_encode_uint(self.gas_limit as u128),
            self.to.to_vec(),
            vec![], // value = 0
            self.data.clone(),
        ]
    }

    /// keccak256 of `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut items = self.base_items();
        items.push(rlp_encode_uint(self.chain_id as u128));
        items.push(vec![]);
        items.push(vec![]);
        Keccak256::digest(rlp_encode_list(&items)).into()
    }

    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s])` with
    /// `v = recovery_id + chainId * 2 + 35`.
    pub fn encode_signed(&self, r: &[u8; 32], s: &[u8; 32], recovery_id: u8) -> Vec<u8> {
        let v = recovery_id as u128 + self.chain_id as u128 * 2 + 35;
        let mut items = self.base_items();
        items.push(rlp_encode_uint(v));
        items.push(rlp_trim(r).to_vec());
        items.push(rlp_trim(s).to_vec());
        rlp_encode_list(&items)
    }
}

// ============================================================================
// RLP ENCODING HELPERS
// ============================================================================

/// Encode an integer as big-endian bytes with no leading zeros (RLP integer format).
pub fn rlp_encode_uint(val: u128) -> Vec<u8> {
    rlp_trim(&val.to_be_bytes()).to_vec()
}

fn rlp_trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// RLP-encode a single byte-string item.
pub fn rlp_encode_item(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        vec![data[0]]
    } else if data.len() <= 55 {
        let mut out = vec![0x80 + data.len() as u8];
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = rlp_encode_uint(data.len() as u128);
        let mut out = vec![0xb7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

/// RLP-encode a list of items (each item is raw bytes, NOT RLP-encoded).
pub fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flat_map(|item| rlp_encode_item(item)).collect();

    if payload.len() <= 55 {
        let mut out = vec![0xc0 + payload.len() as u8];
        out.extend(payload);
        out
    } else {
        let len_bytes = rlp_encode_uint(payload.len() as u128);
        let mut out = vec![0xf7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend(payload);
        out
    }
}

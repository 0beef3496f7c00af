//! FIO binary serialization
//!
//! FIO transactions are packed in the Antelope binary format before signing.
//! This module covers account names, variable-length integers, the binary
//! contract ABI returned by `get_raw_abi`, ABI-driven action data encoding and
//! the transaction envelope itself.
//!
//! ## Transaction layout
//!
//! ```text
//! expiration u32 | ref_block_num u16 | ref_block_prefix u32
//! max_net_usage_words varuint32 | max_cpu_usage_ms u8 | delay_sec varuint32
//! context_free_actions [] | actions [] | transaction_extensions []
//! ```

use std::collections::HashMap;

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Maximum alias depth followed when resolving ABI type names.
const MAX_TYPE_DEPTH: usize = 32;

// ============================================================================
// NAMES
// ============================================================================

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as u64 + 6),
        b'1'..=b'5' => Some((c - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

/// Encodes an account/action name (up to 13 chars of `.a-z1-5`) into its u64 form.
pub fn name_to_u64(name: &str) -> Result<u64> {
    let bytes = name.as_bytes();
    if bytes.len() > 13 {
        anyhow::bail!("Name '{}' is longer than 13 characters", name);
    }

    let mut value = 0u64;
    for (i, &c) in bytes.iter().enumerate() {
        let symbol =
            char_to_symbol(c).ok_or_else(|| anyhow::anyhow!("Invalid character in name '{}'", name))?;
        if i < 12 {
            value |= (symbol & 0x1f) << (64 - 5 * (i + 1));
        } else {
            if symbol > 0x0f {
                anyhow::bail!("Invalid 13th character in name '{}'", name);
            }
            value |= symbol;
        }
    }
    Ok(value)
}

/// Decodes the u64 form of a name back into its string.
pub fn u64_to_name(value: u64) -> String {
    const CHARMAP: &[u8] = b".12345abcdefghijklmnopqrstuvwxyz";
    let mut chars = [b'.'; 13];
    let mut tmp = value;
    for i in 0..13 {
        let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
        chars[12 - i] = CHARMAP[(tmp & mask) as usize];
        tmp >>= shift;
    }
    String::from_utf8_lossy(&chars)
        .trim_end_matches('.')
        .to_string()
}

// ============================================================================
// BYTE WRITER / READER
// ============================================================================

/// Little-endian binary writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// LEB128 encoding of a 32-bit unsigned value.
    pub fn push_varuint32(&mut self, mut v: u32) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                break;
            }
            self.buf.push(byte | 0x80);
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).context("Byte field longer than u32::MAX")?;
        self.push_varuint32(len);
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push_string(&mut self, s: &str) -> Result<()> {
        self.push_bytes(s.as_bytes())
    }

    pub fn push_name(&mut self, name: &str) -> Result<()> {
        self.push_u64(name_to_u64(name)?);
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| anyhow::anyhow!("Unexpected end of ABI data at byte {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_varuint32(&mut self) -> Result<u32> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let byte = self.take(1)?[0];
            if shift >= 35 {
                anyhow::bail!("varuint32 overflow at byte {}", self.pos);
            }
            value |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_varuint32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).context("ABI string is not valid UTF-8")
    }

    fn read_vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_varuint32()? as usize;
        (0..count).map(|_| item(self)).collect()
    }
}

// ============================================================================
// ABI DEFINITION
// ============================================================================

/// A struct declared in a contract ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiStruct {
    pub name: String,
    pub base: String,
    /// (field name, field type) in declaration order
    pub fields: Vec<(String, String)>,
}

/// The parts of a contract ABI needed to serialize action data.
#[derive(Debug, Clone, Default)]
pub struct AbiDefinition {
    pub version: String,
    /// alias -> aliased type
    pub types: HashMap<String, String>,
    pub structs: HashMap<String, AbiStruct>,
    /// action name -> struct type of its data
    pub actions: HashMap<String, String>,
}

impl AbiDefinition {
    /// Parses the base64 ABI returned by `get_raw_abi` (padding optional).
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let bytes = general_purpose::STANDARD_NO_PAD
            .decode(trimmed)
            .context("Raw ABI is not valid base64")?;
        Self::from_bytes(&bytes)
    }

    /// Parses a binary `abi_def` up to and including its action list.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.read_string()?;
        if !version.starts_with("eosio::abi/1.") {
            anyhow::bail!("Unsupported ABI version '{}'", version);
        }

        let types = reader
            .read_vec(|r| Ok((r.read_string()?, r.read_string()?)))?
            .into_iter()
            .collect();

        let structs = reader
            .read_vec(|r| {
                let name = r.read_string()?;
                let base = r.read_string()?;
                let fields = r.read_vec(|r| Ok((r.read_string()?, r.read_string()?)))?;
                Ok(AbiStruct { name, base, fields })
            })?
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        let actions = reader
            .read_vec(|r| {
                let name = u64_to_name(r.read_u64()?);
                let ty = r.read_string()?;
                let _ricardian_contract = r.read_string()?;
                Ok((name, ty))
            })?
            .into_iter()
            .collect();

        Ok(Self {
            version,
            types,
            structs,
            actions,
        })
    }

    /// Serializes the JSON data of `action` following its ABI struct.
    pub fn serialize_action_data(&self, action: &str, data: &Value) -> Result<Vec<u8>> {
        let ty = self
            .actions
            .get(action)
            .ok_or_else(|| anyhow::anyhow!("Action '{}' not found in ABI", action))?;
        let mut writer = ByteWriter::new();
        self.serialize_type(ty, data, &mut writer, 0)
            .with_context(|| format!("Failed to serialize '{}' action data", action))?;
        Ok(writer.into_bytes())
    }

    fn resolve_alias<'a>(&'a self, ty: &'a str) -> Result<&'a str> {
        let mut current = ty;
        for _ in 0..MAX_TYPE_DEPTH {
            match self.types.get(current) {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        anyhow::bail!("Type alias chain too deep for '{}'", ty)
    }

    fn serialize_type(&self, ty: &str, value: &Value, w: &mut ByteWriter, depth: usize) -> Result<()> {
        if depth > MAX_TYPE_DEPTH {
            anyhow::bail!("Type nesting too deep at '{}'", ty);
        }

        if let Some(inner) = ty.strip_suffix("[]") {
            let items = value
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Expected array for '{}'", ty))?;
            w.push_varuint32(u32::try_from(items.len()).context("Array too long")?);
            for item in items {
                self.serialize_type(inner, item, w, depth + 1)?;
            }
            return Ok(());
        }

        if let Some(inner) = ty.strip_suffix('?') {
            if value.is_null() {
                w.push_u8(0);
            } else {
                w.push_u8(1);
                self.serialize_type(inner, value, w, depth + 1)?;
            }
            return Ok(());
        }

        let resolved = self.resolve_alias(ty)?;
        if resolved != ty {
            return self.serialize_type(resolved, value, w, depth + 1);
        }

        match ty {
            "bool" => w.push_u8(
                value
                    .as_bool()
                    .ok_or_else(|| anyhow::anyhow!("Expected bool, got {}", value))? as u8,
            ),
            "int8" => w.push_u8(json_i64(value)?.try_into().map(|v: i8| v as u8).context("int8 out of range")?),
            "uint8" => w.push_u8(json_u64(value)?.try_into().context("uint8 out of range")?),
            "int16" => w.push_u16(json_i64(value)?.try_into().map(|v: i16| v as u16).context("int16 out of range")?),
            "uint16" => w.push_u16(json_u64(value)?.try_into().context("uint16 out of range")?),
            "int32" => w.push_u32(json_i64(value)?.try_into().map(|v: i32| v as u32).context("int32 out of range")?),
            "uint32" => w.push_u32(json_u64(value)?.try_into().context("uint32 out of range")?),
            "int64" => w.push_u64(json_i64(value)? as u64),
            "uint64" => w.push_u64(json_u64(value)?),
            "varuint32" => w.push_varuint32(json_u64(value)?.try_into().context("varuint32 out of range")?),
            "name" => w.push_name(json_str(value)?)?,
            "string" => w.push_string(json_str(value)?)?,
            "bytes" => w.push_bytes(&hex::decode(json_str(value)?).context("Invalid hex for bytes")?)?,
            "checksum256" => {
                let bytes = hex::decode(json_str(value)?).context("Invalid hex for checksum256")?;
                if bytes.len() != 32 {
                    anyhow::bail!("checksum256 must be 32 bytes, got {}", bytes.len());
                }
                w.buf.extend_from_slice(&bytes);
            }
            _ => {
                let def = self
                    .structs
                    .get(ty)
                    .ok_or_else(|| anyhow::anyhow!("Unknown ABI type '{}'", ty))?;
                if !def.base.is_empty() {
                    self.serialize_type(&def.base, value, w, depth + 1)?;
                }
                let object = value
                    .as_object()
                    .ok_or_else(|| anyhow::anyhow!("Expected object for struct '{}'", ty))?;
                for (field, field_ty) in &def.fields {
                    let field_value = object.get(field).unwrap_or(&Value::Null);
                    if field_value.is_null() && !field_ty.ends_with('?') {
                        anyhow::bail!("Missing field '{}' of struct '{}'", field, ty);
                    }
                    self.serialize_type(field_ty, field_value, w, depth + 1)
                        .with_context(|| format!("field '{}'", field))?;
                }
            }
        }
        Ok(())
    }
}

fn json_str(value: &Value) -> Result<&str> {
    value
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("Expected string, got {}", value))
}

fn json_u64(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("Expected unsigned integer, got {}", n)),
        Value::String(s) => s.parse().with_context(|| format!("Invalid unsigned integer '{}'", s)),
        other => Err(anyhow::anyhow!("Expected unsigned integer, got {}", other)),
    }
}

fn json_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("Expected integer, got {}", n)),
        Value::String(s) => s.parse().with_context(|| format!("Invalid integer '{}'", s)),
        other => Err(anyhow::anyhow!("Expected integer, got {}", other)),
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Authorization of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionLevel {
    pub actor: String,
    pub permission: String,
}

/// One contract action with already-serialized data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub account: String,
    pub name: String,
    pub authorization: Vec<PermissionLevel>,
    pub data: Vec<u8>,
}

/// Transaction header plus actions; resource limits and delay are always zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Expiration as seconds since the Unix epoch
    pub expiration: u32,
    /// Low 16 bits of the reference block number
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub actions: Vec<Action>,
}

impl Transaction {
    /// Packs the transaction in its binary wire format.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.push_u32(self.expiration);
        w.push_u16(self.ref_block_num);
        w.push_u32(self.ref_block_prefix);
        w.push_varuint32(0); // max_net_usage_words
        w.push_u8(0); // max_cpu_usage_ms
        w.push_varuint32(0); // delay_sec
        w.push_varuint32(0); // context_free_actions

        w.push_varuint32(u32::try_from(self.actions.len()).context("Too many actions")?);
        for action in &self.actions {
            w.push_name(&action.account)?;
            w.push_name(&action.name)?;
            w.push_varuint32(
                u32::try_from(action.authorization.len()).context("Too many authorizations")?,
            );
            for auth in &action.authorization {
                w.push_name(&auth.actor)?;
                w.push_name(&auth.permission)?;
            }
            w.push_bytes(&action.data)?;
        }

        w.push_varuint32(0); // transaction_extensions
        Ok(w.into_bytes())
    }
}

/// Digest signed by the oracle: sha256(chain_id || packed_trx || zero cfd hash).
pub fn signing_digest(chain_id_hex: &str, packed_trx: &[u8]) -> Result<[u8; 32]> {
    let chain_id = hex::decode(chain_id_hex).context("Chain id is not valid hex")?;
    if chain_id.len() != 32 {
        anyhow::bail!("Chain id must be 32 bytes, got {}", chain_id.len());
    }
    let mut hasher = Sha256::new();
    hasher.update(&chain_id);
    hasher.update(packed_trx);
    hasher.update([0u8; 32]);
    Ok(hasher.finalize().into())
}

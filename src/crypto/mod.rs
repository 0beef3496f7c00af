//! Cryptographic Operations Module
//!
//! This module handles key loading and signing for the oracle. Both the EVM
//! chains and FIO use secp256k1, so the same k256 primitives back two signers:
//! - [`EvmSigner`] signs keccak256 hashes of legacy EIP-155 transactions
//! - [`FioSigner`] signs FIO transaction digests and emits `SIG_K1_` strings
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys are read from environment variables and must never
//! be logged. Only derived addresses and public keys are printed.

mod fio;

pub use fio::{is_canonical, FioSigner};

use anyhow::{Context, Result};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

// ============================================================================
// EVM SIGNER
// ============================================================================

/// ECDSA signer for Ethereum and Polygon transactions.
pub struct EvmSigner {
    signing_key: SigningKey,
}

impl EvmSigner {
    /// Creates a signer from a hex private key (with or without `0x`).
    pub fn from_hex(private_key_hex: &str) -> Result<Self> {
        let clean = private_key_hex.trim();
        let clean = clean.strip_prefix("0x").unwrap_or(clean);
        let bytes = hex::decode(clean).context("EVM private key is not valid hex")?;

        if bytes.len() != 32 {
            return Err(anyhow::anyhow!(
                "Invalid EVM private key length: expected 32 bytes, got {}",
                bytes.len()
            ));
        }

        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create ECDSA signing key: {}", e))?;

        Ok(Self { signing_key })
    }

    /// Returns the lowercase `0x` Ethereum address of this key.
    pub fn address(&self) -> String {
        ethereum_address(self.signing_key.verifying_key())
    }

    /// Signs a raw transaction hash.
    ///
    /// This does NOT apply the Ethereum signed message prefix; the caller passes
    /// the keccak256 hash of an RLP-encoded unsigned transaction.
    ///
    /// # Returns
    ///
    /// * `Ok((r, s, recovery_id))` - r and s are 32-byte big-endian, recovery_id is 0 or 1
    pub fn sign_transaction_hash(&self, tx_hash: &[u8; 32]) -> Result<([u8; 32], [u8; 32], u8)> {
        use k256::ecdsa::signature::hazmat::PrehashSigner;

        let signature: Signature = self
            .signing_key
            .sign_prehash(tx_hash)
            .map_err(|e| anyhow::anyhow!("Failed to sign transaction hash: {}", e))?;

        let recovery_id = recovery_id(self.signing_key.verifying_key(), tx_hash, &signature)?;

        let sig_bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&sig_bytes[..32]);
        s.copy_from_slice(&sig_bytes[32..64]);

        Ok((r, s, recovery_id))
    }
}

/// Derives the Ethereum address of a public key:
/// last 20 bytes of keccak256 over the uncompressed point without its 0x04 tag.
pub fn ethereum_address(verifying_key: &VerifyingKey) -> String {
    let point = verifying_key.to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Finds the recovery id that maps `signature` over `prehash` back to `verifying_key`.
pub(crate) fn recovery_id(
    verifying_key: &VerifyingKey,
    prehash: &[u8; 32],
    signature: &Signature,
) -> Result<u8> {
    for candidate in 0u8..=1 {
        let id = RecoveryId::try_from(candidate)
            .map_err(|e| anyhow::anyhow!("Invalid recovery id {}: {}", candidate, e))?;
        if let Ok(recovered) = VerifyingKey::recover_from_prehash(prehash, signature, id) {
            if &recovered == verifying_key {
                return Ok(candidate);
            }
        }
    }
    Err(anyhow::anyhow!("Could not recover signing key from signature"))
}

//! FIO key handling and transaction signatures.

use anyhow::{Context, Result};
use k256::ecdsa::signature::hazmat::RandomizedPrehashSigner;
use k256::ecdsa::{Signature, SigningKey};
use rand::rngs::OsRng;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use super::recovery_id;

/// Version byte of legacy WIF private keys.
const WIF_VERSION: u8 = 0x80;
/// Upper bound on re-signing attempts while looking for a canonical signature.
const MAX_CANONICAL_ATTEMPTS: usize = 128;

/// Signer for FIO transactions.
pub struct FioSigner {
    signing_key: SigningKey,
}

impl FioSigner {
    /// Parses a private key in legacy WIF (`5...`) or `PVT_K1_` format.
    pub fn from_key_string(key: &str) -> Result<Self> {
        let key = key.trim();
        let secret = if let Some(body) = key.strip_prefix("PVT_K1_") {
            let raw = bs58::decode(body)
                .into_vec()
                .context("PVT_K1 key is not valid base58")?;
            if raw.len() != 36 {
                anyhow::bail!("Invalid PVT_K1 key length: expected 36 bytes, got {}", raw.len());
            }
            let (secret, checksum) = raw.split_at(32);
            if checksum != &k1_checksum(secret)[..] {
                anyhow::bail!("PVT_K1 key checksum mismatch");
            }
            secret.to_vec()
        } else {
            let raw = bs58::decode(key)
                .into_vec()
                .context("WIF key is not valid base58")?;
            if raw.len() != 37 || raw[0] != WIF_VERSION {
                anyhow::bail!("Invalid WIF key: expected 37 bytes with version 0x80");
            }
            let (payload, checksum) = raw.split_at(33);
            let expected = Sha256::digest(Sha256::digest(payload));
            if checksum != &expected[..4] {
                anyhow::bail!("WIF key checksum mismatch");
            }
            payload[1..].to_vec()
        };

        let signing_key = SigningKey::from_slice(&secret)
            .map_err(|e| anyhow::anyhow!("Failed to create FIO signing key: {}", e))?;
        Ok(Self { signing_key })
    }

    /// Legacy `FIO...` public key string of this signer.
    pub fn public_key(&self) -> String {
        let point = self.signing_key.verifying_key().to_encoded_point(true);
        let compressed = point.as_bytes();
        let checksum = Ripemd160::digest(compressed);
        let mut data = compressed.to_vec();
        data.extend_from_slice(&checksum[..4]);
        format!("FIO{}", bs58::encode(data).into_string())
    }

    /// Signs a 32-byte transaction digest, returning a `SIG_K1_` string.
    ///
    /// FIO nodes only accept canonical signatures, so signing is retried with
    /// fresh randomness until both r and s are canonical.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String> {
        for _ in 0..MAX_CANONICAL_ATTEMPTS {
            let signature: Signature = self
                .signing_key
                .sign_prehash_with_rng(&mut OsRng, digest)
                .map_err(|e| anyhow::anyhow!("Failed to sign FIO digest: {}", e))?;
            let rs = signature.to_bytes();
            if !is_canonical(&rs) {
                continue;
            }

            let recid = recovery_id(self.signing_key.verifying_key(), digest, &signature)?;
            let mut compact = Vec::with_capacity(69);
            compact.push(recid + 27 + 4);
            compact.extend_from_slice(&rs);
            let checksum = k1_checksum(&compact);
            compact.extend_from_slice(&checksum);

            return Ok(format!("SIG_K1_{}", bs58::encode(compact).into_string()));
        }

        anyhow::bail!(
            "No canonical signature found after {} attempts",
            MAX_CANONICAL_ATTEMPTS
        )
    }
}

/// Canonical r||s: neither half has its high bit set or a redundant leading zero.
pub fn is_canonical(rs: &[u8]) -> bool {
    rs.len() == 64
        && rs[0] & 0x80 == 0
        && !(rs[0] == 0 && rs[1] & 0x80 == 0)
        && rs[32] & 0x80 == 0
        && !(rs[32] == 0 && rs[33] & 0x80 == 0)
}

fn k1_checksum(data: &[u8]) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(b"K1");
    let hash = hasher.finalize();
    [hash[0], hash[1], hash[2], hash[3]]
}

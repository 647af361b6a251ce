//! Crypto module for credential encryption/decryption
//!
//! Encrypts third-party API credentials at rest using AES-256-CBC with a
//! random per-call IV. The persisted envelope format is
//! `hex(iv) + ":" + hex(ciphertext)` with a 16-byte IV.
//!
//! Security notes:
//! - The key is injected at construction, never read from a module-level
//!   default and never shipped with a hardcoded fallback
//! - IVs are fresh per encryption call, so identical plaintexts produce
//!   different envelopes
//! - Key material is zeroized on drop

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;
use zeroize::Zeroize;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const ENVELOPE_SEPARATOR: char = ':';

/// Crypto error types
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption key is not configured")]
    KeyNotConfigured,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("decryption failed - wrong key or corrupted ciphertext")]
    DecryptionFailed,

    #[error("random generator failure")]
    Rng,
}

/// Symmetric cipher for credential storage.
///
/// Constructed once per process from the configured secret and shared
/// read-only afterwards.
pub struct CredentialCipher {
    key: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Create a cipher from the configured secret string.
    ///
    /// A 64-character hex secret is used verbatim as 32 raw key bytes.
    /// Anything else is right-padded with `'0'` and truncated to 32 bytes
    /// so encrypt/decrypt stay compatible across restarts with the same
    /// configured secret.
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyNotConfigured);
        }

        let key = normalize_key(secret);

        if secret.len() < KEY_LEN {
            // Known design risk: padding weakens short keys. Callers should
            // provision a full 32-character (or 64-hex) secret.
            log::warn!(
                "encryption secret is shorter than {} characters and will be zero-padded",
                KEY_LEN
            );
        }

        Ok(Self {
            key,
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt a plaintext credential into a storable envelope.
    ///
    /// Empty input returns an empty string, never an envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut iv = [0u8; IV_LEN];
        self.rng.fill(&mut iv).map_err(|_| CryptoError::Rng)?;

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            ENVELOPE_SEPARATOR,
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`CryptoError::MalformedEnvelope`] when the input does
    /// not split into exactly one IV part and one ciphertext part, and
    /// with [`CryptoError::DecryptionFailed`] when the key does not match.
    /// Never partially succeeds.
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        if envelope.is_empty() {
            return Ok(String::new());
        }

        let mut parts = envelope.split(ENVELOPE_SEPARATOR);
        let (iv_hex, ct_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(iv), Some(ct), None) => (iv, ct),
            _ => {
                return Err(CryptoError::MalformedEnvelope(
                    "expected <iv-hex>:<ciphertext-hex>".to_string(),
                ))
            }
        };

        let iv_bytes = hex::decode(iv_hex)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid IV hex: {}", e)))?;
        let iv: [u8; IV_LEN] = iv_bytes
            .try_into()
            .map_err(|_| CryptoError::MalformedEnvelope("IV must be 16 bytes".to_string()))?;

        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("invalid ciphertext hex: {}", e)))?;
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(CryptoError::MalformedEnvelope(
                "ciphertext length is not a whole number of blocks".to_string(),
            ));
        }

        let mut plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        match String::from_utf8(plaintext.clone()) {
            Ok(s) => {
                plaintext.zeroize();
                Ok(s)
            }
            Err(_) => {
                plaintext.zeroize();
                // Wrong key can unpad "successfully" into garbage bytes;
                // reject instead of returning them.
                Err(CryptoError::DecryptionFailed)
            }
        }
    }

    /// One-way SHA-256 digest, hex encoded.
    ///
    /// Deterministic - same input always yields the same digest. Used for
    /// verification values that never need to be recovered.
    pub fn hash(&self, text: &str) -> String {
        use sha2::{Digest, Sha256};
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    /// Generate a cryptographically random hex token of `len_bytes` bytes.
    ///
    /// Used for out-of-band verification flows; independent of the
    /// encryption key.
    pub fn generate_token(&self, len_bytes: usize) -> Result<String, CryptoError> {
        let mut bytes = vec![0u8; len_bytes];
        self.rng.fill(&mut bytes).map_err(|_| CryptoError::Rng)?;
        Ok(hex::encode(bytes))
    }
}

impl Drop for CredentialCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Normalize the configured secret into exactly 32 key bytes.
fn normalize_key(secret: &str) -> [u8; KEY_LEN] {
    if secret.len() == 64 {
        if let Ok(raw) = hex::decode(secret) {
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&raw);
            return key;
        }
    }

    let mut padded = secret.as_bytes().to_vec();
    padded.resize(KEY_LEN, b'0');
    padded.truncate(KEY_LEN);

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&padded);
    padded.zeroize();
    key
}

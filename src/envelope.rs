//! Cipher for the bank's encrypted request/response envelopes.
//!
//! Layout before base64: `iv (16) || ciphertext || tag (16) || salt (16)`.
//! The AES-256-GCM key is derived per message with PBKDF2-HMAC-SHA256 over
//! the shared passphrase and the message salt.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ROUNDS: u32 = 65_536;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid base64")]
    Encoding,
    #[error("envelope is {0} bytes, shorter than the fixed header and trailer")]
    Truncated(usize),
    #[error("envelope failed authentication")]
    Authentication,
    #[error("envelope plaintext is not JSON: {0}")]
    Payload(String),
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error("cipher task failed: {0}")]
    Task(String),
}

/// Seals and opens bank envelopes with a shared passphrase.
#[derive(Clone)]
pub struct BankCipher {
    passphrase: String,
}

impl BankCipher {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(self.passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
        key
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, EnvelopeError> {
        let mut iv = [0u8; IV_LEN];
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut iv);
        OsRng.fill_bytes(&mut salt);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm16::new_from_slice(&key)
            .map_err(|e| EnvelopeError::Cipher(e.to_string()))?;
        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
            .map_err(|_| EnvelopeError::Cipher("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(IV_LEN + sealed.len() + SALT_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&sealed);
        out.extend_from_slice(&salt);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>, EnvelopeError> {
        let raw = STANDARD
            .decode(envelope.trim())
            .map_err(|_| EnvelopeError::Encoding)?;
        if raw.len() < IV_LEN + TAG_LEN + SALT_LEN {
            return Err(EnvelopeError::Truncated(raw.len()));
        }

        let (iv, rest) = raw.split_at(IV_LEN);
        let (sealed, salt) = rest.split_at(rest.len() - SALT_LEN);

        let key = self.derive_key(salt);
        let cipher = Aes256Gcm16::new_from_slice(&key)
            .map_err(|e| EnvelopeError::Cipher(e.to_string()))?;
        cipher
            .decrypt(Nonce::<U16>::from_slice(iv), sealed)
            .map_err(|_| EnvelopeError::Authentication)
    }

    pub fn seal_json(&self, value: &Value) -> Result<String, EnvelopeError> {
        let bytes = serde_json::to_vec(value).map_err(|e| EnvelopeError::Payload(e.to_string()))?;
        self.encrypt(&bytes)
    }

    pub fn open_json(&self, envelope: &str) -> Result<Value, EnvelopeError> {
        let bytes = self.decrypt(envelope)?;
        serde_json::from_slice(&bytes).map_err(|e| EnvelopeError::Payload(e.to_string()))
    }

    /// `seal_json` on the blocking pool. Key derivation is too slow for a runtime worker.
    pub async fn seal_json_async(&self, value: Value) -> Result<String, EnvelopeError> {
        let cipher = self.clone();
        tokio::task::spawn_blocking(move || cipher.seal_json(&value))
            .await
            .map_err(|e| EnvelopeError::Task(e.to_string()))?
    }

    /// `open_json` on the blocking pool.
    pub async fn open_json_async(&self, envelope: String) -> Result<Value, EnvelopeError> {
        let cipher = self.clone();
        tokio::task::spawn_blocking(move || cipher.open_json(&envelope))
            .await
            .map_err(|e| EnvelopeError::Task(e.to_string()))?
    }
}

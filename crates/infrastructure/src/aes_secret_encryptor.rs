//! AES-256-GCM sealing of tenant credentials at rest.
//!
//! Stored layout is `nonce || ciphertext+tag`, with a fresh 12-byte nonce per
//! write, so equal secrets never produce equal column values.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use tenantry_application::SecretEncryptor;
use tenantry_core::{AppError, AppResult};

const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32;
const KEY_VARIABLE: &str = "TENANT_SECRET_ENCRYPTION_KEY";

type CredentialNonce = Nonce<<Aes256Gcm as AeadCore>::NonceSize>;

/// Seals shared secrets and OAuth client tokens before they reach storage.
#[derive(Clone)]
pub struct AesSecretEncryptor {
    cipher: Aes256Gcm,
}

impl AesSecretEncryptor {
    /// Creates an encryptor from raw key bytes.
    #[must_use]
    pub fn new(key_bytes: &[u8; KEY_LENGTH]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key_bytes.into()),
        }
    }

    /// Creates an encryptor from the hex key configured for the tenant store.
    pub fn from_hex(hex_key: &str) -> AppResult<Self> {
        let decoded = hex::decode(hex_key.trim()).map_err(|error| {
            AppError::Validation(format!("invalid {KEY_VARIABLE} hex: {error}"))
        })?;

        let key: [u8; KEY_LENGTH] = decoded.as_slice().try_into().map_err(|_| {
            AppError::Validation(format!(
                "{KEY_VARIABLE} must decode to {KEY_LENGTH} bytes, got {}",
                decoded.len()
            ))
        })?;

        Ok(Self::new(&key))
    }
}

impl SecretEncryptor for AesSecretEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|error| AppError::Internal(format!("failed to seal credential: {error}")))?;

        Ok([nonce.as_slice(), sealed.as_slice()].concat())
    }

    fn decrypt(&self, stored: &[u8]) -> AppResult<Vec<u8>> {
        let (nonce, sealed) = split_nonce(stored)?;

        self.cipher.decrypt(&nonce, sealed).map_err(|error| {
            AppError::Internal(format!("failed to open stored credential: {error}"))
        })
    }
}

fn split_nonce(stored: &[u8]) -> AppResult<(CredentialNonce, &[u8])> {
    let Some((nonce, sealed)) = stored.split_first_chunk::<NONCE_LENGTH>() else {
        return Err(AppError::Internal(format!(
            "stored credential is {} bytes, shorter than its nonce",
            stored.len()
        )));
    };

    Ok((Nonce::from(*nonce), sealed))
}

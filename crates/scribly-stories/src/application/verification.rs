//! Email-verification tokens.
//!
//! A token is `hex(nonce || AES-256-GCM(json(payload)))` with a fresh random
//! 96-bit nonce per token. The key is supplied at startup.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use scribly_core::error::DomainError;

use crate::domain::user::VerificationPayload;

/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Seals and opens verification tokens.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher").finish_non_exhaustive()
    }
}

impl TokenCipher {
    /// Builds a cipher from a 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the key has the wrong length.
    pub fn new(key: &[u8]) -> Result<Self, DomainError> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            DomainError::Infrastructure(format!(
                "email verification key must be {KEY_LEN} bytes, got {}",
                key.len()
            ))
        })?;
        Ok(Self { cipher })
    }

    /// Encrypts `payload` into a hex token.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization or encryption
    /// fails.
    pub fn seal(&self, payload: &VerificationPayload) -> Result<String, DomainError> {
        let plaintext = serde_json::to_vec(payload).map_err(|e| {
            DomainError::Infrastructure(format!("token payload serialization failed: {e}"))
        })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| DomainError::Infrastructure("token encryption failed".to_owned()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Decrypts and authenticates a hex token.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Token` if the token is not hex, too short, fails
    /// authentication, or does not hold a payload.
    pub fn open(&self, token: &str) -> Result<VerificationPayload, DomainError> {
        let sealed = hex::decode(token.trim())
            .map_err(|_| DomainError::Token("token is not valid hex".to_owned()))?;
        let Some((nonce, ciphertext)) = sealed.split_at_checked(NONCE_LEN) else {
            return Err(DomainError::Token("token is too short".to_owned()));
        };
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DomainError::Token("token could not be authenticated".to_owned()))?;
        serde_json::from_slice(&plaintext)
            .map_err(|_| DomainError::Token("token payload is malformed".to_owned()))
    }
}

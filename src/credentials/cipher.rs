//! Secret-at-rest encryption
//!
//! Secret keys are stored as `base64(nonce || ciphertext || tag)` under
//! AES-256-GCM with a fresh random 96-bit nonce per encryption. The 32-byte
//! server key is derived from the configured passphrase with HKDF-SHA256.

use super::CredentialError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

const NONCE_LEN: usize = 12;
const KEY_SALT: &[u8] = b"bkt-object-storage-v1";
const KEY_INFO: &[u8] = b"secret-key-encryption";

/// Plaintext secret access key.
///
/// The buffer is wiped on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<String>);

impl SecretKey {
    pub fn new(secret: String) -> Self {
        Self(Zeroizing::new(secret))
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(**redacted**)")
    }
}

/// AES-256-GCM cipher for stored secret keys
pub struct SecretCipher {
    key: Zeroizing<[u8; 32]>,
}

impl fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the server key from a passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CredentialError> {
        if passphrase.is_empty() {
            return Err(CredentialError::Encryption(
                "encryption passphrase must not be empty".into(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), passphrase.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        hk.expand(KEY_INFO, key.as_mut())
            .map_err(|e| CredentialError::Encryption(format!("key derivation failed: {}", e)))?;

        Ok(Self { key })
    }

    /// Use raw key material directly
    pub fn from_key(key: [u8; 32]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Encrypt a secret for storage
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CredentialError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CredentialError::Encryption("encryption failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(sealed))
    }

    /// Decrypt a stored secret
    pub fn decrypt(&self, encoded: &str) -> Result<SecretKey, CredentialError> {
        let sealed = STANDARD
            .decode(encoded)
            .map_err(|e| CredentialError::Encryption(format!("invalid base64: {}", e)))?;

        if sealed.len() < NONCE_LEN {
            return Err(CredentialError::Encryption("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let cipher = self.cipher()?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                .map_err(|_| CredentialError::Encryption("authentication tag mismatch".into()))?,
        );

        let secret = std::str::from_utf8(&plaintext)
            .map_err(|_| CredentialError::Encryption("secret is not valid UTF-8".into()))?;

        Ok(SecretKey::new(secret.to_owned()))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CredentialError> {
        Aes256Gcm::new_from_slice(self.key.as_ref())
            .map_err(|e| CredentialError::Encryption(format!("failed to create cipher: {}", e)))
    }
}

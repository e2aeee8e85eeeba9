// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Symmetric encryption for portal credentials and bearer tokens.
//!
//! AES-256-GCM via `ring`, with the key derived from the process-wide
//! `CREDENTIAL_KEY` secret using HKDF-SHA256. Each ciphertext is bound to
//! its owner through the AEAD associated data, so a value copied from one
//! user's record into another's fails to decrypt.
//!
//! Stored format: `base64(nonce || ciphertext || tag)`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::sync::Arc;

const HKDF_SALT: &[u8] = b"study-tracker";
const HKDF_INFO: &[u8] = b"credential-encryption-v1";

/// Errors from the credential cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Encryption failed")]
    Encrypt,

    /// Wrong key, wrong owner or tampered data.
    #[error("Decryption failed")]
    Decrypt,

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),
}

impl From<CipherError> for crate::error::AppError {
    fn from(err: CipherError) -> Self {
        crate::error::AppError::Internal(anyhow::anyhow!(err))
    }
}

/// Encrypts and decrypts secrets bound to a user ID.
#[derive(Clone)]
pub struct CredentialCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl CredentialCipher {
    /// Derive the AES key from the configured secret.
    pub fn new(secret: &[u8]) -> Result<Self, CipherError> {
        let mut okm = [0u8; 32];
        Hkdf::<Sha256>::new(Some(HKDF_SALT), secret)
            .expand(HKDF_INFO, &mut okm)
            .map_err(|_| CipherError::KeyDerivation)?;

        let unbound =
            UnboundKey::new(&AES_256_GCM, &okm).map_err(|_| CipherError::KeyDerivation)?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(unbound)),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` for `user_id`.
    pub fn encrypt(&self, user_id: u64, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CipherError::Encrypt)?;

        let aad = associated_data(user_id);
        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(aad.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| CipherError::Encrypt)?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&in_out);
        Ok(BASE64.encode(combined))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt) for the same user.
    pub fn decrypt(&self, user_id: u64, encoded: &str) -> Result<String, CipherError> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|e| CipherError::Malformed(e.to_string()))?;
        if combined.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CipherError::Malformed("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CipherError::Malformed("bad nonce".to_string()))?;

        let aad = associated_data(user_id);
        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(aad.as_bytes()), &mut in_out)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|e| CipherError::Malformed(e.to_string()))
    }
}

fn associated_data(user_id: u64) -> String {
    format!("user_id:{}", user_id)
}

/// Encrypt a login/password pair for storage.
pub fn encrypt_credentials(
    cipher: &CredentialCipher,
    user_id: u64,
    login: &str,
    password: &str,
) -> Result<(String, String), CipherError> {
    Ok((
        cipher.encrypt(user_id, login)?,
        cipher.encrypt(user_id, password)?,
    ))
}

/// Decrypt a stored login/password pair.
pub fn decrypt_credentials(
    cipher: &CredentialCipher,
    user_id: u64,
    login_encrypted: &str,
    password_encrypted: &str,
) -> Result<(String, String), CipherError> {
    Ok((
        cipher.decrypt(user_id, login_encrypted)?,
        cipher.decrypt(user_id, password_encrypted)?,
    ))
}

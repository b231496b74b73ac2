//! Encryption of TOTP secrets at rest (AES-256-GCM)
//!
//! Stored form: base64(nonce || ciphertext || tag). The method id is bound
//! as associated data, so a secret copied onto another row fails to open.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;

use crate::error::{Result, TwoFactorError};

const KEY_LEN: usize = 32;

#[derive(Clone)]
pub struct SecretCipher {
    key: Arc<LessSafeKey>,
    rng: SystemRandom,
}

impl SecretCipher {
    /// Build a cipher from a base64 encoded 256-bit key
    pub fn from_base64(key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key.trim())
            .map_err(|e| TwoFactorError::Config(format!("Invalid encryption key: {}", e)))?;

        if bytes.len() != KEY_LEN {
            return Err(TwoFactorError::Config(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }

        let key = UnboundKey::new(&AES_256_GCM, &bytes)
            .map_err(|_| TwoFactorError::Crypto("Failed to load encryption key".to_string()))?;

        Ok(Self {
            key: Arc::new(LessSafeKey::new(key)),
            rng: SystemRandom::new(),
        })
    }

    /// Generate a fresh random key, base64 encoded
    pub fn generate_key() -> Result<String> {
        let mut bytes = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut bytes)
            .map_err(|_| TwoFactorError::Crypto("Random generator failure".to_string()))?;
        Ok(BASE64.encode(bytes))
    }

    pub fn encrypt(&self, plaintext: &str, context: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| TwoFactorError::Crypto("Random generator failure".to_string()))?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::from(context.as_bytes()),
                &mut in_out,
            )
            .map_err(|_| TwoFactorError::Crypto("Encryption failed".to_string()))?;

        let mut stored = nonce_bytes.to_vec();
        stored.extend_from_slice(&in_out);
        Ok(BASE64.encode(stored))
    }

    pub fn decrypt(&self, stored: &str, context: &str) -> Result<String> {
        let bytes = BASE64
            .decode(stored)
            .map_err(|e| TwoFactorError::Crypto(format!("Corrupt ciphertext: {}", e)))?;

        if bytes.len() < NONCE_LEN {
            return Err(TwoFactorError::Crypto("Ciphertext too short".to_string()));
        }

        let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| TwoFactorError::Crypto("Invalid nonce".to_string()))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::from(context.as_bytes()), &mut in_out)
            .map_err(|_| TwoFactorError::Crypto("Decryption failed".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| TwoFactorError::Crypto("Decrypted secret is not UTF-8".to_string()))
    }
}

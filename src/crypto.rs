use crate::error::PulseError;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::Rng;

const NONCE_SIZE: usize = 12;

/// AES-256-GCM cipher for token values at rest.
///
/// The key is injected at construction (hex-encoded 32 bytes); nothing in the
/// engine reads key material from ambient state. Output is base64 text with
/// the random nonce prepended, safe for a TEXT column.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    pub fn new(key_hex: &str) -> Result<Self, PulseError> {
        let bytes = hex::decode(key_hex)
            .map_err(|e| PulseError::Crypto(format!("encryption key is not valid hex: {e}")))?;
        if bytes.len() != 32 {
            return Err(PulseError::Crypto(format!(
                "encryption key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&bytes)
            .map_err(|_| PulseError::Crypto("invalid encryption key".to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, PulseError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| PulseError::Crypto("encryption failed".to_string()))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(combined))
    }

    pub fn decrypt(&self, ciphertext_b64: &str) -> Result<String, PulseError> {
        let combined = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| PulseError::Crypto(format!("ciphertext is not valid base64: {e}")))?;
        if combined.len() < NONCE_SIZE {
            return Err(PulseError::Crypto(
                "ciphertext too short to contain a nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                PulseError::Crypto("decryption failed; wrong key or corrupt data".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| PulseError::Crypto("decrypted value is not utf-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn round_trip() {
        let cipher = TokenCipher::new(TEST_KEY).unwrap();
        let encrypted = cipher.encrypt("ya29.a0AfH6SMB-token").unwrap();
        assert_ne!(encrypted, "ya29.a0AfH6SMB-token");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "ya29.a0AfH6SMB-token");
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let cipher = TokenCipher::new(TEST_KEY).unwrap();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let cipher = TokenCipher::new(TEST_KEY).unwrap();
        let other = TokenCipher::new(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        let encrypted = cipher.encrypt("secret").unwrap();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(PulseError::Crypto(_))
        ));
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            TokenCipher::new("deadbeef"),
            Err(PulseError::Crypto(_))
        ));
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let cipher = TokenCipher::new(TEST_KEY).unwrap();
        assert!(matches!(
            cipher.decrypt("YWJj"),
            Err(PulseError::Crypto(_))
        ));
    }
}

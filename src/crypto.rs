use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand_core::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption error")]
    Encrypt,
    #[error("decryption error")]
    Decrypt,
    #[error("invalid key")]
    InvalidKey,
    #[error("payload encoding error")]
    Encoding,
}

/// AES-256-GCM for data at rest (answer sequences, display names).
/// Ciphertexts are `base64(nonce || ciphertext)`.
#[derive(Clone)]
pub struct Crypto {
    cipher: Aes256Gcm,
}

impl Crypto {
    pub fn from_key_bytes(key_bytes: &[u8]) -> Result<Self, CryptoError> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidKey);
        }
        let cipher = Aes256Gcm::new_from_slice(key_bytes).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn encrypt_str(&self, value: &str) -> Result<String, CryptoError> {
        self.encrypt(value.as_bytes())
    }

    pub fn decrypt_str(&self, value: &str) -> Result<String, CryptoError> {
        let bytes = self.decrypt(value)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::Decrypt)
    }

    pub fn seal_json<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        let bytes = serde_json::to_vec(value).map_err(|_| CryptoError::Encoding)?;
        self.encrypt(&bytes)
    }

    pub fn open_json<T: DeserializeOwned>(&self, sealed: &str) -> Result<T, CryptoError> {
        let bytes = self.decrypt(sealed)?;
        serde_json::from_slice(&bytes).map_err(|_| CryptoError::Encoding)
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let mut ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        let mut combined = nonce_bytes.to_vec();
        combined.append(&mut ciphertext);
        Ok(general_purpose::STANDARD.encode(combined))
    }

    fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let data = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::Decrypt)?;
        if data.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, cipher_bytes) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), cipher_bytes)
            .map_err(|_| CryptoError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Answer, Trait};

    fn crypto() -> Crypto {
        Crypto::from_key_bytes(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(matches!(
            Crypto::from_key_bytes(&[1u8; 16]),
            Err(CryptoError::InvalidKey)
        ));
    }

    #[test]
    fn test_sealed_answers_open_again() {
        let answers = vec![Answer {
            question_id: "bank-4".to_string(),
            value: 2,
            category: Trait::Openness,
            question_text: None,
        }];
        let sealed = crypto().seal_json(&answers).unwrap();

        assert!(!sealed.contains("bank-4"));
        let opened: Vec<Answer> = crypto().open_json(&sealed).unwrap();
        assert_eq!(opened, answers);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let sealed = crypto().encrypt_str("Ada").unwrap();
        let mut raw = general_purpose::STANDARD.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        let tampered = general_purpose::STANDARD.encode(raw);

        assert!(crypto().decrypt_str(&tampered).is_err());
        assert!(crypto().decrypt_str("not base64!").is_err());

        let other = Crypto::from_key_bytes(&[8u8; 32]).unwrap();
        assert!(other.decrypt_str(&sealed).is_err());
    }
}

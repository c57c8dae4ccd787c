use aes_gcm::{
  Aes256Gcm, Nonce,
  aead::{Aead, KeyInit},
};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
  #[error("Invalid encryption key: {0}")]
  InvalidKey(String),

  #[error("Encryption failed: {0}")]
  EncryptionFailed(String),

  #[error("Decryption failed: {0}")]
  DecryptionFailed(String),
}

/// AES-256-GCM sealing of the persisted Google token file.
///
/// A sealed payload is base64(nonce || ciphertext) with a fresh random 96-bit
/// nonce per call.
pub struct AesTokenEncryption {
  cipher: Aes256Gcm,
}

impl AesTokenEncryption {
  /// `key_base64` must decode to exactly 32 bytes (`openssl rand -base64 32`).
  pub fn new(key_base64: &str) -> Result<Self, EncryptionError> {
    let key_bytes = general_purpose::STANDARD
      .decode(key_base64.trim())
      .map_err(|e| EncryptionError::InvalidKey(format!("not base64: {}", e)))?;

    let key: [u8; KEY_LEN] = key_bytes.as_slice().try_into().map_err(|_| {
      EncryptionError::InvalidKey(format!(
        "expected {} bytes, got {}",
        KEY_LEN,
        key_bytes.len()
      ))
    })?;

    Ok(Self {
      cipher: Aes256Gcm::new(&key.into()),
    })
  }

  /// Builds the cipher only when a key is configured.
  pub fn from_optional_key(key_base64: Option<&str>) -> Result<Option<Self>, EncryptionError> {
    key_base64
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .map(Self::new)
      .transpose()
  }

  pub fn seal(&self, plaintext: &[u8]) -> Result<String, EncryptionError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = self
      .cipher
      .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
      .map_err(|e| EncryptionError::EncryptionFailed(e.to_string()))?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(general_purpose::STANDARD.encode(sealed))
  }

  pub fn open(&self, sealed: &str) -> Result<Vec<u8>, EncryptionError> {
    let combined = general_purpose::STANDARD
      .decode(sealed.trim())
      .map_err(|e| EncryptionError::DecryptionFailed(format!("not base64: {}", e)))?;

    if combined.len() <= NONCE_LEN {
      return Err(EncryptionError::DecryptionFailed(
        "payload too short".to_string(),
      ));
    }

    let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
    self
      .cipher
      .decrypt(Nonce::from_slice(nonce), ciphertext)
      .map_err(|e| EncryptionError::DecryptionFailed(e.to_string()))
  }
}

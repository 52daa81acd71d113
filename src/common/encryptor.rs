use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Master key length in bytes: 32 for the AES-256-GCM subkey, 32 for the
/// HMAC-SHA256 subkey.
pub const MASTER_KEY_LEN: usize = 64;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("encryption key must be exactly {MASTER_KEY_LEN} bytes")]
    InvalidKeyLength,
    #[error("invalid ciphertext")]
    InvalidCiphertext,
    #[error("encryption failed")]
    EncryptionFailed,
}

/// Deterministic, reversible encryption of file names into opaque storage
/// keys.
///
/// The nonce is not random: it is an HMAC-SHA256 of the plaintext truncated
/// to 12 bytes, so the same name always maps to the same key and no nonce
/// state has to be stored next to the ciphertext. Reusing a nonce per
/// plaintext weakens confidentiality for low-entropy or repeated inputs;
/// this is an addressing scheme, not general-purpose encryption.
///
/// Wire format: `base64url_nopad(nonce (12 bytes) || ciphertext || tag)`.
#[derive(Clone)]
pub struct Encryptor {
    cipher: Aes256Gcm,
    mac: Hmac<Sha256>,
}

impl Encryptor {
    pub fn new(master_key: &str) -> Result<Self, EncryptError> {
        let bytes = master_key.as_bytes();
        if bytes.len() != MASTER_KEY_LEN {
            return Err(EncryptError::InvalidKeyLength);
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&bytes[..32]));
        let mac = <Hmac<Sha256> as Mac>::new_from_slice(&bytes[32..])
            .map_err(|_| EncryptError::InvalidKeyLength)?;

        Ok(Self { cipher, mac })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptError> {
        let nonce_bytes = self.derive_nonce(plaintext.as_bytes());
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);

        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptError> {
        if encoded.is_empty() {
            return Err(EncryptError::InvalidCiphertext);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| EncryptError::InvalidCiphertext)?;

        if raw.len() < NONCE_LEN {
            return Err(EncryptError::InvalidCiphertext);
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| EncryptError::InvalidCiphertext)?;

        String::from_utf8(plaintext).map_err(|_| EncryptError::InvalidCiphertext)
    }

    fn derive_nonce(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(plaintext);
        let digest = mac.finalize().into_bytes();

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

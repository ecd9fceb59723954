//! AEAD: AES-256-GCM

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use getrandom::getrandom;
use zeroize::Zeroizing;

use crate::error::{DecryptionError, MailError};
use crate::wire::{AES_KEY_BYTES, NONCE_BYTES};

/// Generate a random 12-byte nonce. Used during encryption only.
pub fn nonce() -> Result<[u8; NONCE_BYTES], MailError> {
    let mut n = [0u8; NONCE_BYTES];
    getrandom(&mut n).map_err(|e| MailError::Encryption(format!("rng: {e}")))?;
    Ok(n)
}

/// Fresh per-message content-encryption key.
pub fn content_key() -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, MailError> {
    let mut k = Zeroizing::new([0u8; AES_KEY_BYTES]);
    getrandom(&mut k[..]).map_err(|e| MailError::Encryption(format!("rng: {e}")))?;
    Ok(k)
}

/// AEAD seal (encrypt path).
pub fn aead_seal(
    key: &[u8; AES_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, MailError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| MailError::Encryption("invalid key length".into()))?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: plaintext, aad };
    cipher
        .encrypt(n, payload)
        .map_err(|_| MailError::Encryption("aead seal".into()))
}

/// AEAD open (decrypt path). Returns DecryptionError on failure.
pub fn aead_open(
    key: &[u8; AES_KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, DecryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DecryptionError)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: ciphertext, aad };
    cipher.decrypt(n, payload).map_err(|_| DecryptionError)
}

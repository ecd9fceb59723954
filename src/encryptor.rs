//! Public-key encryption of a (possibly signed) payload.
//!
//! Per message: a fresh 32-byte content-encryption key (CEK) seals the
//! payload; the CEK is sealed under a key-encryption key (KEK) agreed with
//! the recipient certificate's key. One recipient per envelope.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::aead;
use crate::certificate::Certificate;
use crate::error::{DecryptionError, MailError, Result};
use crate::kdf::{self, ENVELOPE_CONTEXT};
use crate::kem::{self, KemProvider, X25519Provider};
use crate::keystore::PrivateKey;
use crate::signer::Payload;
use crate::wire::{self, AES_KEY_BYTES, FINGERPRINT_BYTES, FLAG_SIGNED};

/// A sealed envelope. Opaque without the recipient's private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    bytes: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Wrap received bytes after checking their framing.
    pub fn from_bytes(bytes: Vec<u8>) -> core::result::Result<Self, DecryptionError> {
        wire::decode_envelope(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the sealed payload is a signed entity.
    pub fn is_signed_payload(&self) -> bool {
        self.bytes[3] & FLAG_SIGNED != 0
    }

    /// Fingerprint of the certificate this envelope is addressed to.
    pub fn recipient_fingerprint(&self) -> [u8; FINGERPRINT_BYTES] {
        let mut fp = [0u8; FINGERPRINT_BYTES];
        fp.copy_from_slice(&self.bytes[wire::HEADER_BYTES..wire::HEADER_BYTES + FINGERPRINT_BYTES]);
        fp
    }

    /// Recover the payload bytes with the recipient's key.
    pub fn decrypt(&self, key: &PrivateKey) -> core::result::Result<Vec<u8>, DecryptionError> {
        let parts = wire::decode_envelope(&self.bytes)?;

        let addressed_to_us = key.certificate().fingerprint()[..].ct_eq(&parts.recipient_fingerprint[..]);
        if !bool::from(addressed_to_us) {
            return Err(DecryptionError);
        }

        let shared = X25519Provider::decapsulate(&key.agreement_secret(), parts.ephemeral_public)?;
        let kek = kdf::derive_kek(
            &shared[..],
            parts.recipient_fingerprint,
            parts.ephemeral_public,
            ENVELOPE_CONTEXT,
        )
        .map_err(|_| DecryptionError)?;

        let unwrapped = Zeroizing::new(aead::aead_open(
            &kek,
            parts.wrap_nonce,
            parts.wrapped_cek,
            parts.key_wrap_aad,
        )?);
        if unwrapped.len() != AES_KEY_BYTES {
            return Err(DecryptionError);
        }
        let mut cek = Zeroizing::new([0u8; AES_KEY_BYTES]);
        cek.copy_from_slice(&unwrapped);

        aead::aead_open(
            &cek,
            parts.content_nonce,
            parts.content_ciphertext,
            parts.content_aad,
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Encryptor;

impl Encryptor {
    pub fn new() -> Self {
        Self
    }

    /// Seal whatever the signing stage produced for `recipient`.
    pub fn encrypt(&self, payload: &Payload, recipient: &Certificate) -> Result<EncryptedEnvelope> {
        self.seal(&payload.to_bytes(), payload.flags(), recipient)
    }

    fn seal(&self, plaintext: &[u8], flags: u8, recipient: &Certificate) -> Result<EncryptedEnvelope> {
        if !recipient.is_valid_now() {
            return Err(MailError::Encryption(format!(
                "recipient certificate {} is outside its validity window",
                recipient.fingerprint_hex()
            )));
        }
        let public = kem::recipient_public(recipient)?;
        let fingerprint = recipient.fingerprint();

        let (shared, ephemeral) = X25519Provider::encapsulate(&public)?;
        let kek = kdf::derive_kek(&shared[..], fingerprint, &ephemeral, ENVELOPE_CONTEXT)?;

        let cek = aead::content_key()?;
        let wrap_nonce = aead::nonce()?;
        let key_wrap_aad = wire::encode_key_wrap_aad(flags, fingerprint, &ephemeral);
        let wrapped_cek = aead::aead_seal(&kek, &wrap_nonce, &cek[..], &key_wrap_aad)?;

        let content_aad = wire::encode_recipient_info(key_wrap_aad, &wrap_nonce, &wrapped_cek)?;
        let content_nonce = aead::nonce()?;
        let ciphertext = aead::aead_seal(&cek, &content_nonce, plaintext, &content_aad)?;

        let bytes = wire::encode_envelope(&content_aad, &content_nonce, &ciphertext)?;
        tracing::debug!(
            recipient = %recipient.fingerprint_hex(),
            plaintext = plaintext.len(),
            envelope = bytes.len(),
            "payload encrypted"
        );
        Ok(EncryptedEnvelope { bytes })
    }
}

//! Recipient side: unwrap a finalized message and check its signature.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::certificate::Certificate;
use crate::encryptor::EncryptedEnvelope;
use crate::error::{DecryptionError, MailError, Result};
use crate::keystore::PrivateKey;
use crate::pipeline::FinalizedMessage;
use crate::signer::SignedEnvelope;

/// A decrypted payload.
#[derive(Clone, Debug)]
pub struct Opened {
    payload: Vec<u8>,
    signed: Option<SignedEnvelope>,
}

impl Opened {
    /// The decrypted bytes: a `multipart/signed` entity or the bare message.
    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn signed(&self) -> Option<&SignedEnvelope> {
        self.signed.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signed.is_some()
    }

    /// The composed message, with any signature wrapping removed.
    pub fn message_bytes(&self) -> &[u8] {
        match &self.signed {
            Some(signed) => signed.content(),
            None => &self.payload,
        }
    }

    /// Verify against the sender's certificate. Unsigned payloads fail.
    pub fn verify(&self, sender: &Certificate) -> Result<()> {
        match &self.signed {
            Some(signed) => signed.verify(sender),
            None => Err(MailError::SignatureInvalid("message is not signed".into())),
        }
    }
}

/// Decrypt a finalized message addressed to `key`.
pub fn open(message: &FinalizedMessage, key: &PrivateKey) -> Result<Opened> {
    open_envelope(message.envelope(), key)
}

/// Decrypt a rendered RFC 5322 message addressed to `key`.
pub fn open_raw(raw: &[u8], key: &PrivateKey) -> Result<Opened> {
    open_envelope(&extract_envelope(raw)?, key)
}

pub fn open_envelope(envelope: &EncryptedEnvelope, key: &PrivateKey) -> Result<Opened> {
    let payload = envelope.decrypt(key)?;
    let signed = if envelope.is_signed_payload() {
        Some(SignedEnvelope::from_bytes(&payload)?)
    } else {
        None
    };
    tracing::debug!(bytes = payload.len(), signed = signed.is_some(), "envelope opened");
    Ok(Opened { payload, signed })
}

/// Locate and decode the base64 envelope body of a rendered message.
pub fn extract_envelope(raw: &[u8]) -> Result<EncryptedEnvelope> {
    let body_start = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
        .or_else(|| raw.windows(2).position(|w| w == b"\n\n").map(|p| p + 2))
        .ok_or(MailError::Decryption(DecryptionError))?;

    let encoded: Vec<u8> = raw[body_start..]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(encoded).map_err(|_| DecryptionError)?;
    Ok(EncryptedEnvelope::from_bytes(bytes)?)
}

//! Wire formats (v1)
//!
//! Encrypted envelope:
//!   version[1] || suite_kem[1] || suite_aead[1] || flags[1] || recipient_info_len[2]
//!   || recipient_fp[32] || ephemeral_pk[32] || wrap_nonce[12] || wrapped_cek[48]
//!   || content_nonce[12] || content_ct[16+]
//!
//! The header and recipient info together are the AAD of the content
//! ciphertext. The first 70 bytes (header, fingerprint, ephemeral key) are the
//! AAD of the key wrap.
//!
//! Detached signature blob:
//!   version[1] || suite_sig[1] || cert_len[2] || signer_cert_der[cert_len] || signature[64]

use crate::error::{DecryptionError, MailError};

/// Protocol identifier for KDF domain separation
pub const PROTOCOL_ID: &[u8] = b"citadel-mail-v1";

/// Version byte for v1
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Suite identifiers (on-wire)
pub const SUITE_KEM_X25519: u8 = 0xC1;
pub const SUITE_AEAD_AES256GCM: u8 = 0xB1;
pub const SUITE_SIG_ED25519: u8 = 0xE1;

/// Flags
pub const FLAGS_NONE: u8 = 0x00;
/// Payload is a signed entity (multipart/signed), not a bare message.
pub const FLAG_SIGNED: u8 = 0x01;
const FLAGS_KNOWN: u8 = FLAG_SIGNED;

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

pub const X25519_KEY_BYTES: usize = 32;
pub const ED25519_KEY_BYTES: usize = 32;
pub const ED25519_SIGNATURE_BYTES: usize = 64;

/// X25519 shared secret size
pub const SHARED_SECRET_BYTES: usize = 32;

/// SHA-256 of the recipient certificate DER
pub const FINGERPRINT_BYTES: usize = 32;

pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const AES_KEY_BYTES: usize = 32;

/// CEK sealed under the KEK: cek[32] || tag[16]
pub const WRAPPED_CEK_BYTES: usize = AES_KEY_BYTES + AEAD_TAG_BYTES; // 48

/// recipient_fp[32] || ephemeral_pk[32] || wrap_nonce[12] || wrapped_cek[48]
pub const RECIPIENT_INFO_BYTES: usize =
    FINGERPRINT_BYTES + X25519_KEY_BYTES + NONCE_BYTES + WRAPPED_CEK_BYTES; // 124

/// Header size: version + suite_kem + suite_aead + flags + recipient_info_len(u16)
pub const HEADER_BYTES: usize = 1 + 1 + 1 + 1 + 2; // 6

/// Bytes covered by the key-wrap AAD: header + fingerprint + ephemeral key
pub const KEY_WRAP_AAD_BYTES: usize = HEADER_BYTES + FINGERPRINT_BYTES + X25519_KEY_BYTES; // 70

/// Minimum envelope size: header + recipient info + nonce + tag
pub const MIN_ENVELOPE_BYTES: usize =
    HEADER_BYTES + RECIPIENT_INFO_BYTES + NONCE_BYTES + AEAD_TAG_BYTES; // 158

/// Signature blob header: version + suite_sig + cert_len(u16)
pub const SIGNATURE_HEADER_BYTES: usize = 1 + 1 + 2;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Borrowed view of a parsed envelope.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeComponents<'a> {
    pub version: u8,
    pub suite_kem: u8,
    pub suite_aead: u8,
    pub flags: u8,
    pub recipient_fingerprint: &'a [u8; FINGERPRINT_BYTES],
    pub ephemeral_public: &'a [u8; X25519_KEY_BYTES],
    pub wrap_nonce: &'a [u8; NONCE_BYTES],
    pub wrapped_cek: &'a [u8; WRAPPED_CEK_BYTES],
    pub content_nonce: &'a [u8; NONCE_BYTES],
    pub content_ciphertext: &'a [u8],
    /// AAD for the key wrap.
    pub key_wrap_aad: &'a [u8],
    /// AAD for the content (header + recipient info).
    pub content_aad: &'a [u8],
}

pub fn decode_envelope(data: &[u8]) -> Result<EnvelopeComponents<'_>, DecryptionError> {
    if data.len() < MIN_ENVELOPE_BYTES {
        return Err(DecryptionError);
    }

    let version = data[0];
    let suite_kem = data[1];
    let suite_aead = data[2];
    let flags = data[3];
    let ri_len = u16::from_be_bytes([data[4], data[5]]);

    if version != PROTOCOL_VERSION {
        return Err(DecryptionError);
    }
    if suite_kem != SUITE_KEM_X25519 || suite_aead != SUITE_AEAD_AES256GCM {
        return Err(DecryptionError);
    }
    if flags & !FLAGS_KNOWN != 0 {
        return Err(DecryptionError);
    }
    if ri_len as usize != RECIPIENT_INFO_BYTES {
        return Err(DecryptionError);
    }

    let fp_start = HEADER_BYTES;
    let eph_start = fp_start + FINGERPRINT_BYTES;
    let wrap_nonce_start = eph_start + X25519_KEY_BYTES;
    let wrapped_start = wrap_nonce_start + NONCE_BYTES;
    let ri_end = wrapped_start + WRAPPED_CEK_BYTES;
    let content_nonce_end = ri_end + NONCE_BYTES;

    let recipient_fingerprint = data[fp_start..eph_start]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let ephemeral_public = data[eph_start..wrap_nonce_start]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let wrap_nonce = data[wrap_nonce_start..wrapped_start]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let wrapped_cek = data[wrapped_start..ri_end]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let content_nonce = data[ri_end..content_nonce_end]
        .try_into()
        .map_err(|_| DecryptionError)?;

    let content_ciphertext = &data[content_nonce_end..];
    if content_ciphertext.len() < AEAD_TAG_BYTES {
        return Err(DecryptionError);
    }

    Ok(EnvelopeComponents {
        version,
        suite_kem,
        suite_aead,
        flags,
        recipient_fingerprint,
        ephemeral_public,
        wrap_nonce,
        wrapped_cek,
        content_nonce,
        content_ciphertext,
        key_wrap_aad: &data[..KEY_WRAP_AAD_BYTES],
        content_aad: &data[..ri_end],
    })
}

/// Header + fingerprint + ephemeral key; the key-wrap AAD.
pub fn encode_key_wrap_aad(
    flags: u8,
    recipient_fingerprint: &[u8; FINGERPRINT_BYTES],
    ephemeral_public: &[u8; X25519_KEY_BYTES],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_BYTES + RECIPIENT_INFO_BYTES);
    out.push(PROTOCOL_VERSION);
    out.push(SUITE_KEM_X25519);
    out.push(SUITE_AEAD_AES256GCM);
    out.push(flags);
    out.extend_from_slice(&(RECIPIENT_INFO_BYTES as u16).to_be_bytes());
    out.extend_from_slice(recipient_fingerprint);
    out.extend_from_slice(ephemeral_public);
    out
}

/// Extend the key-wrap AAD into the full header + recipient info (the content AAD).
pub fn encode_recipient_info(
    mut key_wrap_aad: Vec<u8>,
    wrap_nonce: &[u8; NONCE_BYTES],
    wrapped_cek: &[u8],
) -> Result<Vec<u8>, MailError> {
    if key_wrap_aad.len() != KEY_WRAP_AAD_BYTES || wrapped_cek.len() != WRAPPED_CEK_BYTES {
        return Err(MailError::Encryption("recipient info framing".into()));
    }
    key_wrap_aad.extend_from_slice(wrap_nonce);
    key_wrap_aad.extend_from_slice(wrapped_cek);
    Ok(key_wrap_aad)
}

pub fn encode_envelope(
    content_aad: &[u8],
    content_nonce: &[u8; NONCE_BYTES],
    content_ct: &[u8],
) -> Result<Vec<u8>, MailError> {
    if content_aad.len() != HEADER_BYTES + RECIPIENT_INFO_BYTES {
        return Err(MailError::Encryption("envelope header framing".into()));
    }
    if content_ct.len() < AEAD_TAG_BYTES {
        return Err(MailError::Encryption("ciphertext shorter than tag".into()));
    }

    let mut out = Vec::with_capacity(content_aad.len() + NONCE_BYTES + content_ct.len());
    out.extend_from_slice(content_aad);
    out.extend_from_slice(content_nonce);
    out.extend_from_slice(content_ct);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Signature blob
// ---------------------------------------------------------------------------

/// Borrowed view of a parsed signature blob.
#[derive(Debug, Clone, Copy)]
pub struct SignatureComponents<'a> {
    pub version: u8,
    pub suite_sig: u8,
    pub signer_certificate: &'a [u8],
    pub signature: &'a [u8; ED25519_SIGNATURE_BYTES],
}

pub fn decode_signature(data: &[u8]) -> Result<SignatureComponents<'_>, MailError> {
    let malformed = || MailError::SignatureInvalid("malformed signature blob".into());

    if data.len() < SIGNATURE_HEADER_BYTES + ED25519_SIGNATURE_BYTES {
        return Err(malformed());
    }
    let version = data[0];
    let suite_sig = data[1];
    let cert_len = u16::from_be_bytes([data[2], data[3]]) as usize;

    if version != PROTOCOL_VERSION || suite_sig != SUITE_SIG_ED25519 {
        return Err(malformed());
    }
    if cert_len == 0 || data.len() != SIGNATURE_HEADER_BYTES + cert_len + ED25519_SIGNATURE_BYTES {
        return Err(malformed());
    }

    let cert_end = SIGNATURE_HEADER_BYTES + cert_len;
    let signature = data[cert_end..].try_into().map_err(|_| malformed())?;

    Ok(SignatureComponents {
        version,
        suite_sig,
        signer_certificate: &data[SIGNATURE_HEADER_BYTES..cert_end],
        signature,
    })
}

pub fn encode_signature(
    signer_certificate: &[u8],
    signature: &[u8; ED25519_SIGNATURE_BYTES],
) -> Result<Vec<u8>, MailError> {
    let cert_len = u16::try_from(signer_certificate.len())
        .map_err(|_| MailError::Signing("signer certificate exceeds 64 KiB".into()))?;
    if cert_len == 0 {
        return Err(MailError::Signing("empty signer certificate".into()));
    }

    let mut out =
        Vec::with_capacity(SIGNATURE_HEADER_BYTES + signer_certificate.len() + ED25519_SIGNATURE_BYTES);
    out.push(PROTOCOL_VERSION);
    out.push(SUITE_SIG_ED25519);
    out.extend_from_slice(&cert_len.to_be_bytes());
    out.extend_from_slice(signer_certificate);
    out.extend_from_slice(signature);
    Ok(out)
}

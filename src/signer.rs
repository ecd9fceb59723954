//! Detached signatures.
//!
//! A signed payload is a `multipart/signed` entity. Its first part is the
//! canonical message bytes, unmodified; its second part is the base64
//! signature blob (see [`crate::wire`]). The boundary is derived from the
//! content digest, so signing is deterministic for a given message and key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer as _, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::certificate::{Certificate, SubjectKey};
use crate::error::{MailError, Result};
use crate::keystore::PrivateKey;
use crate::message::Message;
use crate::wire::{self, FLAGS_NONE, FLAG_SIGNED};

pub const SIGNATURE_PROTOCOL: &str = "application/citadel-signature";
pub const SIGNATURE_MICALG: &str = "ed25519";
const BOUNDARY_PREFIX: &str = "=_citadel_signed_";
const BASE64_LINE: usize = 76;

// ---------------------------------------------------------------------------
// Signed envelope
// ---------------------------------------------------------------------------

/// Message bytes plus a detached signature over them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    content: Vec<u8>,
    signature: Vec<u8>,
}

impl SignedEnvelope {
    /// The signed bytes, exactly as the composer produced them.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// The raw signature blob.
    pub fn signature_blob(&self) -> &[u8] {
        &self.signature
    }

    /// The certificate the signer embedded in the blob.
    pub fn signer_certificate(&self) -> Result<Certificate> {
        let parts = wire::decode_signature(&self.signature)?;
        Certificate::from_der(parts.signer_certificate)
    }

    fn boundary(&self) -> String {
        let digest = Sha256::digest(&self.content);
        format!("{BOUNDARY_PREFIX}{}", &hex::encode(digest)[..32])
    }

    /// Render as a `multipart/signed` entity.
    pub fn to_bytes(&self) -> Vec<u8> {
        let boundary = self.boundary();
        let mut out = Vec::with_capacity(self.content.len() + self.signature.len() * 2 + 512);

        out.extend_from_slice(
            format!(
                "Content-Type: multipart/signed; protocol=\"{SIGNATURE_PROTOCOL}\"; \
                 micalg={SIGNATURE_MICALG}; boundary=\"{boundary}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        out.extend_from_slice(&self.content);
        out.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        out.extend_from_slice(
            format!(
                "Content-Type: {SIGNATURE_PROTOCOL}; name=signature.csig\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 Content-Disposition: attachment; filename=signature.csig\r\n\r\n"
            )
            .as_bytes(),
        );
        out.extend_from_slice(wrap_base64(&self.signature).as_bytes());
        out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        out
    }

    /// Parse the rendering produced by [`SignedEnvelope::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let malformed = |what: &str| MailError::SignatureInvalid(format!("malformed signed entity: {what}"));

        let header_end = find(bytes, b"\r\n\r\n", 0).ok_or_else(|| malformed("no header block"))?;
        let header = std::str::from_utf8(&bytes[..header_end]).map_err(|_| malformed("header"))?;
        if !header.contains("multipart/signed") {
            return Err(malformed("not multipart/signed"));
        }
        let boundary = header
            .split("boundary=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| malformed("missing boundary"))?;

        let open = format!("--{boundary}\r\n");
        let separator = format!("\r\n--{boundary}\r\n");
        let close = format!("--{boundary}--");

        let open_at = find(bytes, open.as_bytes(), header_end + 4).ok_or_else(|| malformed("first part"))?;
        let content_start = open_at + open.len();
        let content_end =
            find(bytes, separator.as_bytes(), content_start).ok_or_else(|| malformed("second part"))?;

        let sig_part = content_end + separator.len();
        let sig_body = find(bytes, b"\r\n\r\n", sig_part).ok_or_else(|| malformed("signature headers"))? + 4;
        let sig_end = find(bytes, close.as_bytes(), sig_body).ok_or_else(|| malformed("closing boundary"))?;

        let encoded: Vec<u8> = bytes[sig_body..sig_end]
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let signature = STANDARD
            .decode(encoded)
            .map_err(|_| malformed("signature encoding"))?;

        Ok(Self {
            content: bytes[content_start..content_end].to_vec(),
            signature,
        })
    }

    /// Check the signature against the sender's certificate.
    pub fn verify(&self, sender: &Certificate) -> Result<()> {
        let parts = wire::decode_signature(&self.signature)?;
        let SubjectKey::Ed25519(pk) = sender.key() else {
            return Err(MailError::SignatureInvalid(
                "sender certificate has no ed25519 key".into(),
            ));
        };
        let vk = VerifyingKey::from_bytes(pk)
            .map_err(|_| MailError::SignatureInvalid("sender key is not a valid point".into()))?;
        let signature = Signature::from_bytes(parts.signature);
        vk.verify_strict(&self.content, &signature)
            .map_err(|_| MailError::SignatureInvalid("signature does not match content".into()))
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

pub(crate) fn wrap_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE * 2 + 2);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE) {
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push_str("\r\n");
    }
    out
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// What the signing stage hands to the encryptor.
#[derive(Clone, Debug)]
pub enum Payload {
    Signed(SignedEnvelope),
    /// Signing skipped: the composed message, unchanged.
    Unsigned(Message),
}

impl Payload {
    pub fn is_signed(&self) -> bool {
        matches!(self, Payload::Signed(_))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Signed(signed) => signed.to_bytes(),
            Payload::Unsigned(message) => message.to_bytes(),
        }
    }

    /// Envelope header flags describing this payload.
    pub(crate) fn flags(&self) -> u8 {
        if self.is_signed() {
            FLAG_SIGNED
        } else {
            FLAGS_NONE
        }
    }
}

// ---------------------------------------------------------------------------
// Signer
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default)]
pub struct Signer;

impl Signer {
    pub fn new() -> Self {
        Self
    }

    /// Sign `message` with `key`, or pass it through untouched when no key is configured.
    pub fn sign(&self, message: Message, key: Option<&PrivateKey>) -> Result<Payload> {
        let Some(key) = key else {
            tracing::warn!(
                sender = %message.sender(),
                recipient = %message.recipient(),
                "no signing key configured; message will not be signed"
            );
            return Ok(Payload::Unsigned(message));
        };

        let certificate = key.certificate();
        if !certificate.is_valid_now() {
            tracing::warn!(
                alias = %key.alias(),
                fingerprint = %certificate.fingerprint_hex(),
                "signing certificate is outside its validity window"
            );
        }

        let content = message.to_bytes();
        let signature = key
            .signing_key()
            .try_sign(&content)
            .map_err(|e| MailError::Signing(e.to_string()))?;
        let blob = wire::encode_signature(certificate.der(), &signature.to_bytes())?;

        tracing::debug!(alias = %key.alias(), bytes = content.len(), "message signed");
        Ok(Payload::Signed(SignedEnvelope {
            content,
            signature: blob,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_respects_offset() {
        assert_eq!(find(b"abcabc", b"abc", 0), Some(0));
        assert_eq!(find(b"abcabc", b"abc", 1), Some(3));
        assert_eq!(find(b"abc", b"abc", 4), None);
    }

    #[test]
    fn base64_lines_are_wrapped() {
        let wrapped = wrap_base64(&[0xAB; 200]);
        assert!(wrapped.split("\r\n").all(|line| line.len() <= BASE64_LINE));
        assert!(wrapped.ends_with("\r\n"));
    }

    #[test]
    fn entity_rendering_parses_back() {
        let env = SignedEnvelope {
            content: b"From: a@x.com\r\n\r\nbody\r\n".to_vec(),
            signature: vec![0x5A; 150],
        };
        let bytes = env.to_bytes();
        assert_eq!(SignedEnvelope::from_bytes(&bytes).unwrap(), env);

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Content-Type: multipart/signed;"));
    }

    #[test]
    fn unsigned_payload_is_the_message() {
        let msg = crate::message::MessageComposer::new()
            .compose("a@x.com", "b@y.com", "Hi", "hello")
            .unwrap();
        let payload = Signer::new().sign(msg.clone(), None).unwrap();
        assert!(!payload.is_signed());
        assert_eq!(payload.flags(), FLAGS_NONE);
        assert_eq!(payload.to_bytes(), msg.to_bytes());
    }
}

//! Sign-then-encrypt orchestration.
//!
//! ```text
//! lookup ─▶ Composed ─▶ Signed | SigningSkipped ─▶ Encrypted ─▶ Finalized ─▶ Transport
//! ```
//!
//! Strictly linear. Any stage error aborts the send and is returned as-is.

use std::fmt;
use std::sync::Arc;

use lettre::message::{Mailbox, MultiPart};
use lettre::Address;
use rand_core::{OsRng, RngCore};

use crate::certificate::CertificateStore;
use crate::encryptor::{EncryptedEnvelope, Encryptor};
use crate::error::Result;
use crate::keystore::SigningConfig;
use crate::message::{encode_header_text, Content, MessageComposer};
use crate::signer::{wrap_base64, Signer};
use crate::transport::{Ack, Transport};

pub const ENVELOPE_CONTENT_TYPE: &str = "application/x-citadel-envelope; name=message.cenv";
pub const ENVELOPE_DISPOSITION: &str = "attachment; filename=message.cenv";

/// Progress of one send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Composed,
    Signed,
    SigningSkipped,
    Encrypted,
    Finalized,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Composed => "composed",
            PipelineState::Signed => "signed",
            PipelineState::SigningSkipped => "signing-skipped",
            PipelineState::Encrypted => "encrypted",
            PipelineState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Finalized message
// ---------------------------------------------------------------------------

/// The outer message handed to a [`Transport`]. Headers are fixed at
/// construction and nothing can modify them afterwards.
#[derive(Clone, Debug)]
pub struct FinalizedMessage {
    sender: Address,
    recipient: Address,
    message_id: String,
    headers: Vec<(String, String)>,
    envelope: EncryptedEnvelope,
}

impl FinalizedMessage {
    fn finalize(sender: &Mailbox, recipient: &Mailbox, subject: &str, envelope: EncryptedEnvelope) -> Self {
        let message_id = generate_message_id(&sender.email);
        let headers = vec![
            ("Date".to_string(), chrono::Utc::now().to_rfc2822()),
            ("From".to_string(), sender.to_string()),
            ("Sender".to_string(), sender.to_string()),
            ("To".to_string(), recipient.to_string()),
            ("Subject".to_string(), encode_header_text(subject)),
            ("Message-ID".to_string(), message_id.clone()),
            ("MIME-Version".to_string(), "1.0".to_string()),
            ("Content-Type".to_string(), ENVELOPE_CONTENT_TYPE.to_string()),
            ("Content-Disposition".to_string(), ENVELOPE_DISPOSITION.to_string()),
            ("Content-Transfer-Encoding".to_string(), "base64".to_string()),
        ];
        Self {
            sender: sender.email.clone(),
            recipient: recipient.email.clone(),
            message_id,
            headers,
            envelope,
        }
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Outgoing headers in emission order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn envelope(&self) -> &EncryptedEnvelope {
        &self.envelope
    }

    /// RFC 5322 rendering: headers, blank line, base64 envelope.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.envelope.len() * 4 / 3 + 1024);
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(wrap_base64(self.envelope.as_bytes()).as_bytes());
        out
    }
}

fn generate_message_id(sender: &Address) -> String {
    let mut id = [0u8; 16];
    OsRng.fill_bytes(&mut id);
    format!("<{}@{}>", hex::encode(id), sender.domain())
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A message carried through to `Finalized` but not yet submitted.
#[derive(Clone, Debug)]
pub struct Sealed {
    pub message: FinalizedMessage,
    pub signing_skipped: bool,
    pub states: Vec<PipelineState>,
}

/// Outcome of a successful send.
#[derive(Clone, Debug)]
pub struct SendReport {
    pub message_id: String,
    pub signing_skipped: bool,
    pub states: Vec<PipelineState>,
    pub ack: Ack,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Composer → Signer → Encryptor → finalize → Transport.
///
/// Holds no per-message state; one instance can serve concurrent sends.
/// Each send loads its own signing key and drops it before encryption.
pub struct SecureMailPipeline {
    certificates: Arc<dyn CertificateStore>,
    transport: Arc<dyn Transport>,
    signing: SigningConfig,
    composer: MessageComposer,
    signer: Signer,
    encryptor: Encryptor,
}

impl SecureMailPipeline {
    pub fn new(
        certificates: Arc<dyn CertificateStore>,
        transport: Arc<dyn Transport>,
        signing: SigningConfig,
    ) -> Self {
        if signing.is_absent() {
            tracing::warn!("no signing parameters configured; outgoing mail will not be signed");
        }
        Self {
            certificates,
            transport,
            signing,
            composer: MessageComposer::new(),
            signer: Signer::new(),
            encryptor: Encryptor::new(),
        }
    }

    pub fn send_plain(&self, from: &str, to: &str, subject: &str, text: &str) -> Result<SendReport> {
        self.send(from, to, subject, Content::Text(text.to_string()))
    }

    pub fn send_multipart(
        &self,
        from: &str,
        to: &str,
        subject: &str,
        multipart: MultiPart,
    ) -> Result<SendReport> {
        self.send(from, to, subject, Content::Multipart(multipart))
    }

    /// Run every stage, then hand the result to the transport.
    pub fn send(&self, from: &str, to: &str, subject: &str, content: Content) -> Result<SendReport> {
        let Sealed {
            message,
            signing_skipped,
            states,
        } = self.seal(from, to, subject, content)?;

        let ack = self.transport.send(&message)?;
        tracing::info!(
            message_id = %message.message_id(),
            recipient = %message.recipient(),
            signed = !signing_skipped,
            "message submitted"
        );

        Ok(SendReport {
            message_id: message.message_id().to_string(),
            signing_skipped,
            states,
            ack,
        })
    }

    /// Run every stage up to `Finalized` without submitting.
    pub fn seal(&self, from: &str, to: &str, subject: &str, content: Content) -> Result<Sealed> {
        // Resolve the recipient before doing any other work.
        let certificate = self.certificates.lookup(&recipient_identity(to))?;
        let mut states = Vec::with_capacity(4);

        let message = self.composer.compose(from, to, subject, content)?;
        let sender = message.sender().clone();
        let recipient = message.recipient().clone();
        let subject = message.subject().to_string();
        states.push(PipelineState::Composed);

        let payload = {
            let key = self.signing.load()?;
            self.signer.sign(message, key.as_ref())?
        };
        let signing_skipped = !payload.is_signed();
        states.push(if signing_skipped {
            PipelineState::SigningSkipped
        } else {
            PipelineState::Signed
        });

        let envelope = self.encryptor.encrypt(&payload, &certificate)?;
        drop(payload);
        states.push(PipelineState::Encrypted);

        let message = FinalizedMessage::finalize(&sender, &recipient, &subject, envelope);
        states.push(PipelineState::Finalized);

        for (name, value) in message.headers() {
            tracing::info!(target: "citadel_mail::headers", name = %name, value = %value, "outgoing header");
        }

        Ok(Sealed {
            message,
            signing_skipped,
            states,
        })
    }
}

impl fmt::Debug for SecureMailPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureMailPipeline")
            .field("signing", &self.signing)
            .finish_non_exhaustive()
    }
}

/// Bare address from a `To` value, e.g. `Bob <b@y.com>` → `b@y.com`.
fn recipient_identity(to: &str) -> &str {
    match (to.rfind('<'), to.rfind('>')) {
        (Some(start), Some(end)) if start < end => &to[start + 1..end],
        _ => to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_from_display_name_form() {
        assert_eq!(recipient_identity("b@y.com"), "b@y.com");
        assert_eq!(recipient_identity("Bob <b@y.com>"), "b@y.com");
        assert_eq!(recipient_identity(" B@Y.com "), " B@Y.com ");
        assert_eq!(recipient_identity("odd > <b@y.com"), "odd > <b@y.com");
    }

    #[test]
    fn state_names() {
        assert_eq!(PipelineState::SigningSkipped.to_string(), "signing-skipped");
        assert_eq!(PipelineState::Finalized.to_string(), "finalized");
    }

    #[test]
    fn message_ids_use_sender_domain() {
        let addr: Address = "a@x.com".parse().unwrap();
        let a = generate_message_id(&addr);
        let b = generate_message_id(&addr);
        assert!(a.starts_with('<') && a.ends_with("@x.com>"));
        assert_ne!(a, b);
    }
}

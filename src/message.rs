//! Message composition: the unsigned, unencrypted base message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lettre::message::{Mailbox, MultiPart, SinglePart};

use crate::error::{MailError, Result};

/// Body of a message.
#[derive(Clone, Debug)]
pub enum Content {
    /// `text/plain; charset=utf-8`
    Text(String),
    /// Pre-built structure (attachments, alternatives).
    Multipart(MultiPart),
}

impl Content {
    /// The formatted MIME entity: content headers, blank line, body.
    fn formatted(&self) -> Vec<u8> {
        match self {
            Content::Text(text) => SinglePart::plain(text.clone()).formatted(),
            Content::Multipart(multipart) => multipart.formatted(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, Content::Multipart(_))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<MultiPart> for Content {
    fn from(multipart: MultiPart) -> Self {
        Content::Multipart(multipart)
    }
}

/// A composed message, before any cryptographic wrapping.
#[derive(Clone, Debug)]
pub struct Message {
    sender: Mailbox,
    recipient: Mailbox,
    subject: String,
    content: Content,
    headers: Vec<(String, String)>,
}

impl Message {
    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    pub fn recipient(&self) -> &Mailbox {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Message-level headers in insertion order (content headers excluded).
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Canonical bytes: the message headers followed by the MIME content entity.
    ///
    /// These are the bytes the signer signs and the encryptor protects.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(&self.content.formatted());
        out
    }
}

/// Builds [`Message`]s. No I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageComposer;

impl MessageComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        content: impl Into<Content>,
    ) -> Result<Message> {
        let sender = parse_mailbox(sender)?;
        let recipient = parse_mailbox(recipient)?;
        let subject = subject.replace(['\r', '\n'], " ");

        let headers = vec![
            ("From".to_string(), sender.to_string()),
            ("Sender".to_string(), sender.to_string()),
            ("To".to_string(), recipient.to_string()),
            ("Subject".to_string(), encode_header_text(&subject)),
            ("MIME-Version".to_string(), "1.0".to_string()),
        ];

        Ok(Message {
            sender,
            recipient,
            subject,
            content: content.into(),
            headers,
        })
    }
}

pub(crate) fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::AddressFormat {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// RFC 2047 encoded-word for non-ASCII header text.
pub(crate) fn encode_header_text(text: &str) -> String {
    if text.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        text.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(text.as_bytes()))
    }
}

//! Delivery of finalized messages.

use std::sync::Mutex;
use std::time::Duration;

use lettre::address::Envelope;
use lettre::{Address, SmtpTransport};

use crate::config::TransportConfig;
use crate::error::{MailError, Result};
use crate::pipeline::FinalizedMessage;

/// Acknowledgement returned by a transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub message_id: String,
    pub detail: String,
}

/// Hands a finished message to a delivery mechanism.
///
/// Only [`FinalizedMessage`] can be submitted; the pipeline is the only
/// place that builds one.
pub trait Transport: Send + Sync {
    fn send(&self, message: &FinalizedMessage) -> Result<Ack>;
}

// ---------------------------------------------------------------------------
// SMTP relay
// ---------------------------------------------------------------------------

/// Plain SMTP submission through `lettre`. TLS termination is external.
pub struct SmtpRelay {
    inner: SmtpTransport,
    default_sender: Option<Address>,
    debug: bool,
}

impl SmtpRelay {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        if config.timeout_secs == 0 {
            return Err(MailError::Config("smtp timeout must be at least one second".into()));
        }
        let default_sender = config
            .default_sender
            .as_deref()
            .map(|s| {
                s.trim().parse::<Address>().map_err(|e| MailError::AddressFormat {
                    address: s.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let inner = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        tracing::debug!(host = %config.host, port = config.port, "smtp relay configured");
        Ok(Self {
            inner,
            default_sender,
            debug: config.debug,
        })
    }
}

impl Transport for SmtpRelay {
    fn send(&self, message: &FinalizedMessage) -> Result<Ack> {
        let from = self
            .default_sender
            .clone()
            .unwrap_or_else(|| message.sender().clone());
        let envelope = Envelope::new(Some(from), vec![message.recipient().clone()])
            .map_err(|e| MailError::Transport(format!("envelope: {e}")))?;

        let bytes = message.to_bytes();
        if self.debug {
            tracing::debug!(
                message_id = %message.message_id(),
                raw = %String::from_utf8_lossy(&bytes),
                "smtp submission"
            );
        }

        let response = lettre::Transport::send_raw(&self.inner, &envelope, &bytes)
            .map_err(|e| MailError::Transport(e.to_string()))?;

        Ok(Ack {
            message_id: message.message_id().to_string(),
            detail: format!(
                "{} {}",
                response.code(),
                response.message().collect::<Vec<_>>().join(" ")
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// Records submissions instead of delivering them (testing, dry runs).
#[derive(Default)]
pub struct InMemoryTransport {
    sent: Mutex<Vec<FinalizedMessage>>,
    failure: Option<String>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that rejects every submission with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<FinalizedMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or_default()
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, message: &FinalizedMessage) -> Result<Ack> {
        if let Some(reason) = &self.failure {
            return Err(MailError::Transport(reason.clone()));
        }
        self.sent
            .lock()
            .map_err(|_| MailError::Transport("transport state poisoned".into()))?
            .push(message.clone());
        Ok(Ack {
            message_id: message.message_id().to_string(),
            detail: "recorded".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn zero_timeout_rejected() {
        let config = TransportConfig {
            timeout_secs: 0,
            ..TransportConfig::default()
        };
        let err = SmtpRelay::new(&config).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::Config));

        assert!(SmtpRelay::new(&TransportConfig::default()).is_ok());
    }

    #[test]
    fn bad_default_sender_rejected() {
        let config = TransportConfig {
            default_sender: Some("not-an-address".into()),
            ..TransportConfig::default()
        };
        let err = SmtpRelay::new(&config).err().map(|e| e.kind());
        assert_eq!(err, Some(ErrorKind::AddressFormat));
    }
}

//! Error types for the mail pipeline.

use core::fmt;

/// Coarse classification of a [`MailError`], one tag per failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CertificateNotFound,
    CertificateDecode,
    KeyStoreAuth,
    KeyNotFound,
    KeyStoreCorrupt,
    AddressFormat,
    Signing,
    Encryption,
    Decryption,
    SignatureInvalid,
    Transport,
    Config,
    Io,
}

/// Every failure the pipeline, its stages and the recipient side can report.
///
/// Stages fail closed: an `Err` means no partial output was produced.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("no certificate found for {identity}")]
    CertificateNotFound { identity: String },

    #[error("certificate decode failed: {0}")]
    CertificateDecode(String),

    #[error("key store authentication failed for alias {alias:?}")]
    KeyStoreAuth { alias: String },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key store corrupt: {0}")]
    KeyStoreCorrupt(String),

    #[error("malformed address {address:?}: {reason}")]
    AddressFormat { address: String, reason: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CertificateNotFound { .. } => ErrorKind::CertificateNotFound,
            Self::CertificateDecode(_) => ErrorKind::CertificateDecode,
            Self::KeyStoreAuth { .. } => ErrorKind::KeyStoreAuth,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::KeyStoreCorrupt(_) => ErrorKind::KeyStoreCorrupt,
            Self::AddressFormat { .. } => ErrorKind::AddressFormat,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Encryption(_) => ErrorKind::Encryption,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::SignatureInvalid(_) => ErrorKind::SignatureInvalid,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Uniform envelope-opening failure.
///
/// Wrong recipient, truncation, tampering and bad framing all collapse into
/// this one value so a decrypting service does not act as an oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecryptionError;

impl fmt::Display for DecryptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decryption failed")
    }
}

impl std::error::Error for DecryptionError {}

pub type Result<T, E = MailError> = core::result::Result<T, E>;

//! # citadel-mail
//!
//! Sign-then-encrypt mail: compose a message, sign it with the sender's key,
//! encrypt it to the recipient's certificate, and hand the sealed result to
//! a transport.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use citadel_mail::{
//!     DirectoryCertificateStore, InMemoryTransport, SecureMailPipeline, SigningConfig,
//! };
//!
//! let pipeline = SecureMailPipeline::new(
//!     Arc::new(DirectoryCertificateStore::new("certs")),
//!     Arc::new(InMemoryTransport::new()),
//!     SigningConfig::new("keys.json", "alice", "correct horse battery staple"),
//! );
//!
//! let report = pipeline
//!     .send_plain("alice@example.com", "bob@example.com", "Hi", "hello")
//!     .unwrap();
//! assert!(!report.signing_skipped);
//! ```
//!
//! ## Security Properties
//!
//! - **Sign, then encrypt**: the signature covers the exact composed bytes
//!   and travels inside the envelope
//! - **Ed25519** detached signatures; the signer's certificate is embedded
//! - **X25519 + HKDF-SHA256 + AES-256-GCM** envelope with a fresh content
//!   key per message, bound to the recipient certificate fingerprint
//! - **Uniform errors**: every envelope-opening failure is the same
//!   [`DecryptionError`]
//! - **Fail closed**: a missing certificate aborts before composition;
//!   only a fully absent signing configuration degrades to a warning
//!
//! ## What's NOT Provided
//!
//! - Certificate chain validation or revocation
//! - TLS to the relay
//! - A general MIME parser
//! - Multiple recipients per envelope

#![deny(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/citadel-mail/0.1.0")]

// ---------------------------------------------------------------------------
// Internal modules (not part of public API)
// ---------------------------------------------------------------------------

mod aead;
mod error;
mod kdf;
mod kem;

// Public for the CLI `inspect` command and fuzzing; not stable API.
#[doc(hidden)]
pub mod wire;

// ---------------------------------------------------------------------------
// Pipeline components
// ---------------------------------------------------------------------------

pub mod certificate;
pub mod config;
pub mod encryptor;
pub mod keystore;
pub mod message;
pub mod pipeline;
pub mod recipient;
pub mod signer;
pub mod transport;

pub use certificate::{
    normalize_identity, Certificate, CertificateStore, DirectoryCertificateStore,
    StaticCertificateStore, SubjectKey,
};
pub use config::{CertificateSource, MailConfig, TransportConfig};
pub use encryptor::{EncryptedEnvelope, Encryptor};
pub use error::{DecryptionError, ErrorKind, MailError, Result};
pub use keystore::{load_private_key, KdfParams, KeyStoreFile, PrivateKey, SigningConfig};
pub use message::{Content, Message, MessageComposer};
pub use pipeline::{FinalizedMessage, PipelineState, Sealed, SecureMailPipeline, SendReport};
pub use recipient::{extract_envelope, open, open_raw, Opened};
pub use signer::{Payload, SignedEnvelope, Signer};
pub use transport::{Ack, InMemoryTransport, SmtpRelay, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

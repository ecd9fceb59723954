//! Runtime configuration.
//!
//! A JSON file provides the base; `CITADEL_MAIL_*` environment variables
//! override individual fields.
//!
//! ```json
//! {
//!   "transport": { "host": "mail.example.com", "port": 25, "default_sender": "ops@example.com" },
//!   "signing": { "store": "keys.json", "alias": "ops" },
//!   "certificates": { "dir": "certs" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::certificate::{CertificateStore, DirectoryCertificateStore, StaticCertificateStore};
use crate::error::{MailError, Result};
use crate::keystore::SigningConfig;
use crate::pipeline::SecureMailPipeline;
use crate::transport::{SmtpRelay, Transport};

pub const ENV_SMTP_HOST: &str = "CITADEL_MAIL_SMTP_HOST";
pub const ENV_SMTP_PORT: &str = "CITADEL_MAIL_SMTP_PORT";
pub const ENV_FROM: &str = "CITADEL_MAIL_FROM";
pub const ENV_DEBUG: &str = "CITADEL_MAIL_DEBUG";
pub const ENV_KEYSTORE: &str = "CITADEL_MAIL_KEYSTORE";
pub const ENV_KEY_ALIAS: &str = "CITADEL_MAIL_KEY_ALIAS";
pub const ENV_KEY_PASSPHRASE: &str = "CITADEL_MAIL_KEY_PASSPHRASE";
pub const ENV_CERT_DIR: &str = "CITADEL_MAIL_CERT_DIR";

/// Immutable settings for the SMTP relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// SMTP envelope sender; the message `From` when unset.
    pub default_sender: Option<String>,
    /// Log every submitted message in full at debug level.
    pub debug: bool,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 25,
            default_sender: None,
            debug: false,
            timeout_secs: 30,
        }
    }
}

/// Where recipient certificates come from: a directory, or an explicit
/// identity → file map. Not both.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSource {
    pub dir: Option<PathBuf>,
    pub files: BTreeMap<String, PathBuf>,
}

impl CertificateSource {
    pub fn build(&self) -> Result<Arc<dyn CertificateStore>> {
        match (&self.dir, self.files.is_empty()) {
            (Some(_), false) => Err(MailError::Config(
                "certificates: set either `dir` or `files`, not both".into(),
            )),
            (Some(dir), true) => Ok(Arc::new(DirectoryCertificateStore::new(dir.clone()))),
            (None, _) => {
                let mut store = StaticCertificateStore::new();
                for (identity, path) in &self.files {
                    store.insert(identity, std::fs::read(path)?);
                }
                if store.is_empty() {
                    tracing::warn!("no certificate source configured; every lookup will fail");
                }
                Ok(Arc::new(store))
            }
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub transport: TransportConfig,
    pub signing: SigningConfig,
    pub certificates: CertificateSource,
}

impl MailConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| MailError::Config(format!("{}: {e}", path.display())))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any `name → value` source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(ENV_SMTP_HOST) {
            self.transport.host = host;
        }
        if let Some(port) = lookup(ENV_SMTP_PORT) {
            self.transport.port = port
                .trim()
                .parse()
                .map_err(|_| MailError::Config(format!("{ENV_SMTP_PORT}: invalid port {port:?}")))?;
        }
        if let Some(from) = lookup(ENV_FROM) {
            self.transport.default_sender = Some(from);
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            self.transport.debug = matches!(debug.trim(), "1" | "true" | "yes");
        }
        if let Some(store) = lookup(ENV_KEYSTORE) {
            self.signing.store = Some(PathBuf::from(store));
        }
        if let Some(alias) = lookup(ENV_KEY_ALIAS) {
            self.signing.alias = Some(alias);
        }
        if let Some(passphrase) = lookup(ENV_KEY_PASSPHRASE) {
            self.signing.passphrase = Some(Zeroizing::new(passphrase));
        }
        if let Some(dir) = lookup(ENV_CERT_DIR) {
            self.certificates.dir = Some(PathBuf::from(dir));
            self.certificates.files.clear();
        }
        Ok(())
    }

    /// Pipeline submitting through the configured SMTP relay.
    pub fn build_pipeline(&self) -> Result<SecureMailPipeline> {
        let transport = Arc::new(SmtpRelay::new(&self.transport)?);
        self.build_pipeline_with(transport)
    }

    /// Pipeline submitting through a caller-supplied transport.
    pub fn build_pipeline_with(&self, transport: Arc<dyn Transport>) -> Result<SecureMailPipeline> {
        Ok(SecureMailPipeline::new(
            self.certificates.build()?,
            transport,
            self.signing.clone(),
        ))
    }
}

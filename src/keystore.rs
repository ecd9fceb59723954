//! Passphrase-protected key container.
//!
//! One JSON file holds any number of aliased entries. Each entry carries the
//! signer's certificate in the clear and its PKCS#8 Ed25519 key sealed with
//! AES-256-GCM under an Argon2id key derived from the passphrase:
//!
//! ```text
//! {
//!   "version": 1,
//!   "kdf": { "m_cost": 19456, "t_cost": 2, "p_cost": 1 },
//!   "entries": {
//!     "{alias}": { "salt": hex, "nonce": hex, "sealed_key": hex,
//!                  "certificate": hex, "created_at": rfc3339 }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::aead;
use crate::certificate::{Certificate, SubjectKey};
use crate::error::{MailError, Result};
use crate::kem;
use crate::wire::{AES_KEY_BYTES, NONCE_BYTES};

pub const KEYSTORE_VERSION: u32 = 1;
const ENTRY_AAD_PREFIX: &[u8] = b"citadel-mail|keystore|v1|";
const SALT_BYTES: usize = 16;

// ---------------------------------------------------------------------------
// Private key
// ---------------------------------------------------------------------------

/// An unlocked signing key and the certificate it belongs to.
///
/// Not `Clone`; the Ed25519 key is zeroized when this value drops.
pub struct PrivateKey {
    alias: String,
    signing: SigningKey,
    certificate: Certificate,
}

impl PrivateKey {
    /// Pair an Ed25519 signing key with its certificate.
    pub fn new(alias: impl Into<String>, signing: SigningKey, certificate: Certificate) -> Result<Self> {
        let alias = alias.into();
        match certificate.key() {
            SubjectKey::Ed25519(pk) if *pk == signing.verifying_key().to_bytes() => Ok(Self {
                alias,
                signing,
                certificate,
            }),
            SubjectKey::Ed25519(_) => Err(MailError::Signing(format!(
                "key {alias:?} does not match its certificate"
            ))),
            other => Err(MailError::Signing(format!(
                "key {alias:?} has a non-ed25519 certificate ({other:?})"
            ))),
        }
    }

    /// Decode a PKCS#8 DER Ed25519 key.
    pub fn from_pkcs8_der(alias: impl Into<String>, der: &[u8], certificate: Certificate) -> Result<Self> {
        let alias = alias.into();
        let signing = SigningKey::from_pkcs8_der(der)
            .map_err(|e| MailError::KeyStoreCorrupt(format!("key {alias:?}: pkcs8: {e}")))?;
        Self::new(alias, signing, certificate)
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// X25519 secret used to open envelopes addressed to this key's certificate.
    pub(crate) fn agreement_secret(&self) -> StaticSecret {
        kem::recipient_secret(&self.signing)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("alias", &self.alias)
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Container file
// ---------------------------------------------------------------------------

/// Argon2id cost parameters, stored alongside the entries they protect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    fn derive(&self, passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(AES_KEY_BYTES))
            .map_err(|e| MailError::KeyStoreCorrupt(format!("kdf params: {e}")))?;
        let mut out = Zeroizing::new([0u8; AES_KEY_BYTES]);
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(passphrase.as_bytes(), salt, &mut out[..])
            .map_err(|e| MailError::KeyStoreCorrupt(format!("kdf: {e}")))?;
        Ok(out)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyEntry {
    pub salt: String,
    pub nonce: String,
    pub sealed_key: String,
    pub certificate: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory form of a key container file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyStoreFile {
    pub version: u32,
    pub kdf: KdfParams,
    pub entries: BTreeMap<String, KeyEntry>,
}

impl Default for KeyStoreFile {
    fn default() -> Self {
        Self::new(KdfParams::default())
    }
}

impl KeyStoreFile {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            version: KEYSTORE_VERSION,
            kdf,
            entries: BTreeMap::new(),
        }
    }

    /// Read a container. A missing file is `KeyNotFound`.
    pub fn read(path: &Path) -> Result<Self> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MailError::KeyNotFound(format!(
                    "key store {} does not exist",
                    path.display()
                )))
            }
            Err(e) => return Err(MailError::Io(e)),
        };
        let file: Self = serde_json::from_slice(&data)
            .map_err(|e| MailError::KeyStoreCorrupt(format!("parse {}: {e}", path.display())))?;
        if file.version != KEYSTORE_VERSION {
            return Err(MailError::KeyStoreCorrupt(format!(
                "unsupported key store version {}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Write atomically: temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| MailError::KeyStoreCorrupt(format!("serialize: {e}")))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Seal a PKCS#8 key under `passphrase` and store it with its certificate.
    pub fn insert(
        &mut self,
        alias: &str,
        pkcs8_der: &[u8],
        certificate_der: &[u8],
        passphrase: &str,
    ) -> Result<()> {
        if alias.is_empty() {
            return Err(MailError::Config("key alias must not be empty".into()));
        }
        // Refuse to store a key that could never be loaded again.
        let certificate = Certificate::from_der(certificate_der)?;
        PrivateKey::from_pkcs8_der(alias, pkcs8_der, certificate)?;

        let mut salt = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut salt)
            .map_err(|e| MailError::Config(format!("rng: {e}")))?;
        let nonce = aead::nonce()?;
        let key = self.kdf.derive(passphrase, &salt)?;
        let sealed = aead::aead_seal(&key, &nonce, pkcs8_der, &entry_aad(alias))?;

        self.entries.insert(
            alias.to_string(),
            KeyEntry {
                salt: hex::encode(salt),
                nonce: hex::encode(nonce),
                sealed_key: hex::encode(sealed),
                certificate: hex::encode(certificate_der),
                created_at: Utc::now(),
            },
        );
        tracing::info!(alias = %alias, "stored signing key");
        Ok(())
    }

    /// Unlock one entry.
    pub fn unlock(&self, alias: &str, passphrase: &str) -> Result<PrivateKey> {
        let entry = self
            .entries
            .get(alias)
            .ok_or_else(|| MailError::KeyNotFound(format!("no key with alias {alias:?}")))?;

        let corrupt = |what: &str| MailError::KeyStoreCorrupt(format!("entry {alias:?}: bad {what}"));
        let salt = hex::decode(&entry.salt).map_err(|_| corrupt("salt"))?;
        let nonce: [u8; NONCE_BYTES] = hex::decode(&entry.nonce)
            .ok()
            .and_then(|n| n.try_into().ok())
            .ok_or_else(|| corrupt("nonce"))?;
        let sealed = hex::decode(&entry.sealed_key).map_err(|_| corrupt("sealed_key"))?;
        let cert_der = hex::decode(&entry.certificate).map_err(|_| corrupt("certificate"))?;

        let key = self.kdf.derive(passphrase, &salt)?;
        let pkcs8 = Zeroizing::new(
            aead::aead_open(&key, &nonce, &sealed, &entry_aad(alias)).map_err(|_| {
                MailError::KeyStoreAuth {
                    alias: alias.to_string(),
                }
            })?,
        );

        let certificate = Certificate::from_der(&cert_der)
            .map_err(|e| MailError::KeyStoreCorrupt(format!("entry {alias:?}: {e}")))?;
        PrivateKey::from_pkcs8_der(alias, &pkcs8, certificate)
    }
}

fn entry_aad(alias: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(ENTRY_AAD_PREFIX.len() + alias.len());
    aad.extend_from_slice(ENTRY_AAD_PREFIX);
    aad.extend_from_slice(alias.as_bytes());
    aad
}

/// Read the container at `location` and unlock `alias`.
pub fn load_private_key(location: &Path, alias: &str, passphrase: &str) -> Result<PrivateKey> {
    KeyStoreFile::read(location)?.unlock(alias, passphrase)
}

// ---------------------------------------------------------------------------
// Signing configuration
// ---------------------------------------------------------------------------

/// Where the sender's signing key lives.
///
/// All three fields absent means "send unsigned" (a warning, not an error).
/// Any other combination must load successfully or the send fails.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub store: Option<PathBuf>,
    pub alias: Option<String>,
    pub passphrase: Option<Zeroizing<String>>,
}

impl SigningConfig {
    /// No signing parameters at all.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(store: impl Into<PathBuf>, alias: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            store: Some(store.into()),
            alias: Some(alias.into()),
            passphrase: Some(Zeroizing::new(passphrase.into())),
        }
    }

    fn store(&self) -> Option<&Path> {
        self.store.as_deref().filter(|p| !p.as_os_str().is_empty())
    }

    fn alias(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }

    fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref().map(String::as_str).filter(|p| !p.is_empty())
    }

    /// Whether every signing parameter is absent.
    pub fn is_absent(&self) -> bool {
        self.store().is_none() && self.alias().is_none() && self.passphrase().is_none()
    }

    /// Resolve to a key: `Ok(None)` only when every parameter is absent.
    pub fn load(&self) -> Result<Option<PrivateKey>> {
        if self.is_absent() {
            return Ok(None);
        }
        let alias = self
            .alias()
            .ok_or_else(|| MailError::KeyNotFound("signing key alias not configured".into()))?;
        let store = self
            .store()
            .ok_or_else(|| MailError::KeyNotFound("key store location not configured".into()))?;
        let passphrase = self.passphrase().ok_or_else(|| MailError::KeyStoreAuth {
            alias: alias.to_string(),
        })?;

        load_private_key(store, alias, passphrase).map(Some)
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("store", &self.store)
            .field("alias", &self.alias)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn absent_parameters_skip_signing() {
        assert!(SigningConfig::disabled().load().unwrap().is_none());

        let empty = SigningConfig {
            store: Some(PathBuf::new()),
            alias: Some(String::new()),
            passphrase: None,
        };
        assert!(empty.load().unwrap().is_none());

        let all_empty = SigningConfig {
            store: Some(PathBuf::new()),
            alias: Some(String::new()),
            passphrase: Some(Zeroizing::new(String::new())),
        };
        assert!(all_empty.is_absent());
        assert!(all_empty.load().unwrap().is_none());
    }

    #[test]
    fn partial_parameters_never_skip() {
        let passphrase_only = SigningConfig {
            passphrase: Some(Zeroizing::new("secret".into())),
            ..SigningConfig::default()
        };
        assert_eq!(passphrase_only.load().unwrap_err().kind(), ErrorKind::KeyNotFound);

        let no_store = SigningConfig {
            alias: Some("sender".into()),
            passphrase: Some(Zeroizing::new("secret".into())),
            ..SigningConfig::default()
        };
        assert_eq!(no_store.load().unwrap_err().kind(), ErrorKind::KeyNotFound);

        let no_passphrase = SigningConfig {
            store: Some("/nonexistent/keys.json".into()),
            alias: Some("sender".into()),
            passphrase: None,
        };
        assert_eq!(no_passphrase.load().unwrap_err().kind(), ErrorKind::KeyStoreAuth);
    }

    #[test]
    fn missing_store_file_is_key_not_found() {
        let cfg = SigningConfig::new("/nonexistent/keys.json", "sender", "secret");
        assert_eq!(cfg.load().unwrap_err().kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn debug_redacts_passphrase() {
        let cfg = SigningConfig::new("keys.json", "sender", "hunter2");
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}

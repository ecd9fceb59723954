//! Shared fixtures: Ed25519 identities minted with rcgen, key containers
//! with cheap Argon2 parameters.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use citadel_mail::{
    Certificate, KdfParams, KeyStoreFile, PrivateKey, SigningConfig, StaticCertificateStore,
};

pub const PASSPHRASE: &str = "correct horse battery staple";

/// Argon2id at its minimum useful cost, so tests stay fast.
pub fn cheap_kdf() -> KdfParams {
    KdfParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    }
}

/// A mail identity: certificate plus PKCS#8 key.
pub struct Identity {
    pub email: String,
    pub cert_pem: String,
    pub cert_der: Vec<u8>,
    pub pkcs8: Vec<u8>,
}

impl Identity {
    pub fn new(email: &str) -> Self {
        Self::build(email, false)
    }

    /// Certificate whose validity window closed in 2001.
    pub fn expired(email: &str) -> Self {
        Self::build(email, true)
    }

    fn build(email: &str, expired: bool) -> Self {
        let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
        let mut params = rcgen::CertificateParams::default();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, email);
        params.subject_alt_names = vec![rcgen::SanType::Rfc822Name(email.try_into().unwrap())];
        if expired {
            params.not_before = rcgen::date_time_ymd(2000, 1, 1);
            params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        }
        let cert = params.self_signed(&key).unwrap();

        Self {
            email: email.to_string(),
            cert_pem: cert.pem(),
            cert_der: cert.der().to_vec(),
            pkcs8: key.serialize_der(),
        }
    }

    pub fn certificate(&self) -> Certificate {
        Certificate::from_der(&self.cert_der).unwrap()
    }

    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::from_pkcs8_der(self.email.as_str(), &self.pkcs8, self.certificate()).unwrap()
    }
}

/// Certificate store knowing every identity in `identities`.
pub fn store_for(identities: &[&Identity]) -> StaticCertificateStore {
    identities
        .iter()
        .fold(StaticCertificateStore::new(), |store, id| {
            store.with(&id.email, id.cert_pem.clone())
        })
}

/// Write a container holding `identity` under `alias` into `dir`.
pub fn write_keystore(dir: &Path, alias: &str, identity: &Identity) -> PathBuf {
    let path = dir.join("keys.json");
    let mut file = KeyStoreFile::new(cheap_kdf());
    file.insert(alias, &identity.pkcs8, &identity.cert_der, PASSPHRASE)
        .unwrap();
    file.save(&path).unwrap();
    path
}

/// Signing configuration pointing at a freshly written container.
pub fn signing_config(dir: &Path, identity: &Identity) -> SigningConfig {
    let path = write_keystore(dir, "sender", identity);
    SigningConfig::new(path, "sender", PASSPHRASE)
}

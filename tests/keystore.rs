mod common;

use citadel_mail::keystore::KEYSTORE_VERSION;
use citadel_mail::{load_private_key, ErrorKind, KeyStoreFile, SigningConfig};
use common::{Identity, PASSPHRASE};

#[test]
fn save_read_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let identity = Identity::new("a@x.com");
    let path = common::write_keystore(dir.path(), "sender", &identity);

    let file = KeyStoreFile::read(&path).unwrap();
    assert_eq!(file.version, KEYSTORE_VERSION);
    assert_eq!(file.kdf, common::cheap_kdf());
    assert_eq!(file.aliases().collect::<Vec<_>>(), ["sender"]);

    let key = file.unlock("sender", PASSPHRASE).unwrap();
    assert_eq!(key.alias(), "sender");
    assert_eq!(key.certificate().fingerprint(), identity.certificate().fingerprint());

    // The passphrase never appears in the container.
    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains(PASSPHRASE));
}

#[test]
fn multiple_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");
    let alice = Identity::new("alice@x.com");
    let ops = Identity::new("ops@x.com");

    let mut file = KeyStoreFile::new(common::cheap_kdf());
    file.insert("alice", &alice.pkcs8, &alice.cert_der, "alice-pass").unwrap();
    file.insert("ops", &ops.pkcs8, &ops.cert_der, "ops-pass").unwrap();
    file.save(&path).unwrap();

    let ops_key = load_private_key(&path, "ops", "ops-pass").unwrap();
    assert_eq!(ops_key.certificate().emails(), ["ops@x.com".to_string()]);
    assert_eq!(
        load_private_key(&path, "alice", "ops-pass").unwrap_err().kind(),
        ErrorKind::KeyStoreAuth
    );
}

#[test]
fn wrong_passphrase_is_auth_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_keystore(dir.path(), "sender", &Identity::new("a@x.com"));
    let err = load_private_key(&path, "sender", "not the passphrase").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyStoreAuth);
}

#[test]
fn unknown_alias_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_keystore(dir.path(), "sender", &Identity::new("a@x.com"));
    let err = load_private_key(&path, "someone-else", PASSPHRASE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
}

#[test]
fn renamed_entry_fails_authentication() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_keystore(dir.path(), "sender", &Identity::new("a@x.com"));

    let mut file = KeyStoreFile::read(&path).unwrap();
    let entry = file.entries.remove("sender").unwrap();
    file.entries.insert("impostor".into(), entry);
    file.save(&path).unwrap();

    let err = load_private_key(&path, "impostor", PASSPHRASE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyStoreAuth);
}

#[test]
fn mismatched_certificate_refused() {
    let alice = Identity::new("alice@x.com");
    let bob = Identity::new("bob@y.com");
    let mut file = KeyStoreFile::new(common::cheap_kdf());
    let err = file
        .insert("alice", &alice.pkcs8, &bob.cert_der, PASSPHRASE)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signing);
    assert_eq!(file.aliases().count(), 0);
}

#[test]
fn non_ed25519_certificate_refused() {
    let alice = Identity::new("alice@x.com");
    let ecdsa = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
    let cert = rcgen::CertificateParams::new(vec!["alice.x.com".to_string()])
        .unwrap()
        .self_signed(&ecdsa)
        .unwrap();

    let mut file = KeyStoreFile::new(common::cheap_kdf());
    let err = file
        .insert("alice", &alice.pkcs8, cert.der(), PASSPHRASE)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signing);
    assert_eq!(file.aliases().count(), 0);
}

#[test]
fn corrupt_container_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.json");

    std::fs::write(&path, b"{ not json").unwrap();
    assert_eq!(KeyStoreFile::read(&path).unwrap_err().kind(), ErrorKind::KeyStoreCorrupt);

    std::fs::write(
        &path,
        br#"{ "version": 99, "kdf": { "m_cost": 64, "t_cost": 1, "p_cost": 1 }, "entries": {} }"#,
    )
    .unwrap();
    assert_eq!(KeyStoreFile::read(&path).unwrap_err().kind(), ErrorKind::KeyStoreCorrupt);
}

#[test]
fn signing_config_loads_key() {
    let dir = tempfile::tempdir().unwrap();
    let identity = Identity::new("a@x.com");
    let config = common::signing_config(dir.path(), &identity);

    let key = config.load().unwrap().unwrap();
    assert_eq!(key.certificate().fingerprint(), identity.certificate().fingerprint());
    assert!(SigningConfig::disabled().load().unwrap().is_none());
}

#[cfg(unix)]
#[test]
fn container_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = common::write_keystore(dir.path(), "sender", &Identity::new("a@x.com"));
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

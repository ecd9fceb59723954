//! Key agreement: X25519 ephemeral-static against a certificate key.
//!
//! Ed25519 certificate keys are mapped to their Montgomery form, and the
//! matching Ed25519 signing key to its clamped scalar, so a signing identity
//! can also receive mail:
//!
//!   shared = X25519(ephemeral_sk, montgomery(recipient_pk))
//!          = X25519(scalar(recipient_sk), ephemeral_pk)
//!
//! KEM ciphertext (on wire): ephemeral_pk[32]

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::certificate::{Certificate, SubjectKey};
use crate::error::{DecryptionError, MailError};
use crate::wire::{SHARED_SECRET_BYTES, X25519_KEY_BYTES};

/// Recipient key-agreement public key derived from a certificate.
pub fn recipient_public(cert: &Certificate) -> Result<X25519PublicKey, MailError> {
    match cert.key() {
        SubjectKey::X25519(bytes) => Ok(X25519PublicKey::from(*bytes)),
        SubjectKey::Ed25519(bytes) => {
            let vk = VerifyingKey::from_bytes(bytes).map_err(|_| {
                MailError::Encryption("certificate carries an invalid ed25519 point".into())
            })?;
            Ok(X25519PublicKey::from(vk.to_montgomery().to_bytes()))
        }
        SubjectKey::Unsupported(oid) => Err(MailError::Encryption(format!(
            "certificate key algorithm {oid} cannot receive mail"
        ))),
    }
}

/// Recipient key-agreement secret derived from an Ed25519 signing key.
pub fn recipient_secret(signing: &SigningKey) -> StaticSecret {
    let scalar = Zeroizing::new(signing.to_scalar_bytes());
    StaticSecret::from(*scalar)
}

pub trait KemProvider {
    /// Returns (shared_secret, kem_ciphertext).
    fn encapsulate(
        pk: &X25519PublicKey,
    ) -> Result<(Zeroizing<[u8; SHARED_SECRET_BYTES]>, [u8; X25519_KEY_BYTES]), MailError>;
    /// Returns shared_secret.
    fn decapsulate(
        sk: &StaticSecret,
        ct: &[u8; X25519_KEY_BYTES],
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_BYTES]>, DecryptionError>;
}

/// X25519 ephemeral-static provider.
pub struct X25519Provider;

impl KemProvider for X25519Provider {
    fn encapsulate(
        pk: &X25519PublicKey,
    ) -> Result<(Zeroizing<[u8; SHARED_SECRET_BYTES]>, [u8; X25519_KEY_BYTES]), MailError> {
        let eph = EphemeralSecret::random_from_rng(OsRng);
        let eph_pk = X25519PublicKey::from(&eph);
        let ss = eph.diffie_hellman(pk);

        // Low-order recipient keys yield an all-zero secret.
        if !ss.was_contributory() {
            return Err(MailError::Encryption("non-contributory key agreement".into()));
        }
        Ok((Zeroizing::new(*ss.as_bytes()), eph_pk.to_bytes()))
    }

    fn decapsulate(
        sk: &StaticSecret,
        ct: &[u8; X25519_KEY_BYTES],
    ) -> Result<Zeroizing<[u8; SHARED_SECRET_BYTES]>, DecryptionError> {
        let eph_pk = X25519PublicKey::from(*ct);
        let ss = sk.diffie_hellman(&eph_pk);
        if !ss.was_contributory() {
            return Err(DecryptionError);
        }
        Ok(Zeroizing::new(*ss.as_bytes()))
    }
}

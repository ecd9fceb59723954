//! KDF (v1)
//!
//! info = PROTOCOL_ID || b"|kek|" || SHA3-256(ephemeral_pk) || context
//! kek  = HKDF-SHA256(x25519_shared_secret, salt=recipient_fp, info=info, len=32)

use hkdf::Hkdf;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

use crate::error::MailError;
use crate::wire::{AES_KEY_BYTES, FINGERPRINT_BYTES, PROTOCOL_ID};

/// Context binding key-encryption keys to the enveloped-data purpose.
pub const ENVELOPE_CONTEXT: &[u8] = b"enveloped-data";

pub fn ephemeral_hash(ephemeral_public: &[u8]) -> [u8; 32] {
    let h = Sha3_256::digest(ephemeral_public);
    let mut out = [0u8; 32];
    out.copy_from_slice(&h);
    out
}

pub fn derive_kek(
    shared_secret: &[u8],
    recipient_fingerprint: &[u8; FINGERPRINT_BYTES],
    ephemeral_public: &[u8],
    context: &[u8],
) -> Result<Zeroizing<[u8; AES_KEY_BYTES]>, MailError> {
    let eph_hash = ephemeral_hash(ephemeral_public);
    let mut info = Vec::with_capacity(PROTOCOL_ID.len() + 5 + 32 + context.len());
    info.extend_from_slice(PROTOCOL_ID);
    info.extend_from_slice(b"|kek|");
    info.extend_from_slice(&eph_hash);
    info.extend_from_slice(context);

    let hk = Hkdf::<Sha256>::new(Some(&recipient_fingerprint[..]), shared_secret);
    let mut out = Zeroizing::new([0u8; AES_KEY_BYTES]);
    hk.expand(&info, &mut out[..])
        .map_err(|_| MailError::Encryption("kek derivation".into()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kek_depends_on_every_input() {
        let base = derive_kek(&[1u8; 32], &[2u8; 32], &[3u8; 32], ENVELOPE_CONTEXT).unwrap();
        let again = derive_kek(&[1u8; 32], &[2u8; 32], &[3u8; 32], ENVELOPE_CONTEXT).unwrap();
        assert_eq!(*base, *again);

        let other_ss = derive_kek(&[9u8; 32], &[2u8; 32], &[3u8; 32], ENVELOPE_CONTEXT).unwrap();
        let other_fp = derive_kek(&[1u8; 32], &[9u8; 32], &[3u8; 32], ENVELOPE_CONTEXT).unwrap();
        let other_eph = derive_kek(&[1u8; 32], &[2u8; 32], &[9u8; 32], ENVELOPE_CONTEXT).unwrap();
        let other_ctx = derive_kek(&[1u8; 32], &[2u8; 32], &[3u8; 32], b"other").unwrap();
        for k in [other_ss, other_fp, other_eph, other_ctx] {
            assert_ne!(*base, *k);
        }
    }
}

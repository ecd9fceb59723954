#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static RECIPIENT: Lazy<citadel_mail::PrivateKey> = Lazy::new(|| {
    let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
    let cert = rcgen::CertificateParams::default().self_signed(&key).unwrap();
    let certificate = citadel_mail::Certificate::from_der(cert.der()).unwrap();
    citadel_mail::PrivateKey::from_pkcs8_der("fuzz", &key.serialize_der(), certificate).unwrap()
});

fuzz_target!(|data: &[u8]| {
    let _ = citadel_mail::open_raw(data, &RECIPIENT);
    if let Ok(envelope) = citadel_mail::EncryptedEnvelope::from_bytes(data.to_vec()) {
        let _ = envelope.decrypt(&RECIPIENT);
    }
});

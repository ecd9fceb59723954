use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use citadel_mail::recipient::open_envelope;
use citadel_mail::{
    Certificate, Encryptor, InMemoryTransport, MessageComposer, PrivateKey, SecureMailPipeline,
    Signer, SigningConfig, StaticCertificateStore,
};

fn identity(email: &str) -> (String, PrivateKey) {
    let key = rcgen::KeyPair::generate_for(&rcgen::PKCS_ED25519).unwrap();
    let mut params = rcgen::CertificateParams::default();
    params.subject_alt_names = vec![rcgen::SanType::Rfc822Name(email.try_into().unwrap())];
    let cert = params.self_signed(&key).unwrap();
    let certificate = Certificate::from_der(cert.der()).unwrap();
    let private = PrivateKey::from_pkcs8_der(email, &key.serialize_der(), certificate).unwrap();
    (cert.pem(), private)
}

fn bench_stages(c: &mut Criterion) {
    let (_, sender) = identity("a@x.com");
    let (_, recipient) = identity("b@y.com");
    let body = "x".repeat(4096);

    let message = MessageComposer::new()
        .compose("a@x.com", "b@y.com", "bench", body.as_str())
        .unwrap();
    let payload = Signer::new().sign(message.clone(), Some(&sender)).unwrap();
    let envelope = Encryptor::new()
        .encrypt(&payload, recipient.certificate())
        .unwrap();

    let mut tampered = envelope.as_bytes().to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;

    c.bench_function("sign_4k", |b| {
        b.iter(|| Signer::new().sign(black_box(message.clone()), Some(&sender)).unwrap())
    });
    c.bench_function("encrypt_4k", |b| {
        b.iter(|| Encryptor::new().encrypt(black_box(&payload), recipient.certificate()).unwrap())
    });
    c.bench_function("open_valid", |b| {
        b.iter(|| open_envelope(black_box(&envelope), &recipient).unwrap())
    });
    c.bench_function("open_tampered", |b| {
        b.iter(|| {
            let r = citadel_mail::EncryptedEnvelope::from_bytes(black_box(tampered.clone()))
                .and_then(|e| e.decrypt(&recipient));
            black_box(r.err())
        })
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let (pem, _) = identity("b@y.com");
    let pipeline = SecureMailPipeline::new(
        Arc::new(StaticCertificateStore::new().with("b@y.com", pem)),
        Arc::new(InMemoryTransport::new()),
        SigningConfig::disabled(),
    );

    c.bench_function("seal_unsigned", |b| {
        b.iter(|| {
            pipeline
                .seal("a@x.com", "b@y.com", "bench", black_box("hello").into())
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_stages, bench_pipeline);
criterion_main!(benches);

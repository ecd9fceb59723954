#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = citadel_mail::wire::decode_envelope(data);
    let _ = citadel_mail::wire::decode_signature(data);
    let _ = citadel_mail::SignedEnvelope::from_bytes(data);
});

//! # Packet Signatures
//!
//! HMAC-SHA256 over the raw packet payload, hex encoded on the wire.
//! Verification uses the constant-time comparison provided by `hmac`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `payload` with `secret`, returning the lowercase hex signature.
pub fn sign_payload(payload: &[u8], secret: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never fails in practice.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature produced by [`sign_payload`].
///
/// Returns `false` for malformed hex as well as for a wrong key or a tampered
/// payload.
pub fn verify_payload_signature(payload: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&signature).is_ok()
}

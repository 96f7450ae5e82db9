//! HMAC-SHA256 payload signing.
//!
//! Receivers authenticate a delivery by recomputing the HMAC over the raw
//! request body with the shared endpoint secret and comparing it with the
//! `X-Webhook-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(payload: &[u8], secret: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    mac
}

/// Signs `payload` with `secret`, returning the lower-case hex digest.
pub fn sign(payload: &[u8], secret: &str) -> String {
    hex::encode(mac_for(payload, secret).finalize().into_bytes())
}

/// Verifies a hex signature (optionally `sha256=`-prefixed) in constant time.
///
/// Malformed signatures verify as `false`.
pub fn verify(payload: &[u8], secret: &str, signature: &str) -> bool {
    let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    mac_for(payload, secret).verify_slice(&expected).is_ok()
}

/// Formats the `X-Webhook-Signature` header value.
pub fn signature_header(signature: &str) -> String {
    format!("{SIGNATURE_PREFIX}{signature}")
}

//! HMAC-SHA256 payload signatures for outbound deliveries.
//!
//! Every delivery carries `X-Webhook-Signature: sha256=<hex>` computed
//! over the exact payload bytes with the webhook's shared secret, so
//! receivers can authenticate the sender.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{DeliveryError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Header value prefix for the signature scheme.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes the signature header value for a payload.
///
/// # Errors
///
/// Returns `DeliveryError::Configuration` if the secret cannot key the
/// HMAC.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| DeliveryError::configuration("invalid HMAC secret"))?;
    mac.update(payload);
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Verifies a `sha256=<hex>` signature against a payload.
///
/// Comparison is timing-safe so the check leaks nothing about the
/// expected value.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(hex_signature) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };

    let Ok(expected) = sign_payload(secret, payload) else {
        return false;
    };
    let expected_hex = &expected[SIGNATURE_PREFIX.len()..];

    timing_safe_eq(hex_signature, expected_hex)
}

/// Timing-safe string comparison.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.as_bytes().iter().zip(b.as_bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

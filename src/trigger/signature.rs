//! Webhook signature verification

use crate::core::Provider;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix GitHub and Gitea put in front of the hex digest
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Check that a webhook delivery was produced by someone holding `secret`.
///
/// With no secret configured every delivery is accepted. GitHub and Gitea
/// sign the raw body with HMAC-SHA256; GitLab echoes the secret as a token.
/// Malformed headers yield `false`.
pub fn verify(provider: Provider, payload: &[u8], header: Option<&str>, secret: Option<&str>) -> bool {
    let secret = match secret {
        Some(secret) if !secret.is_empty() => secret,
        _ => return true,
    };

    let Some(header) = header.map(str::trim) else {
        return false;
    };

    match provider {
        Provider::GitHub => header
            .strip_prefix(SIGNATURE_PREFIX)
            .is_some_and(|digest| verify_hmac(secret, payload, digest)),
        // Gitea's own header carries the bare digest
        Provider::Gitea => {
            let digest = header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header);
            verify_hmac(secret, payload, digest)
        }
        Provider::GitLab => tokens_match(header, secret),
    }
}

/// Produce the `sha256=<hex>` header value for a payload
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

fn verify_hmac(secret: &str, payload: &[u8], digest_hex: &str) -> bool {
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // verify_slice compares in constant time
    mac.verify_slice(&expected).is_ok()
}

fn tokens_match(supplied: &str, secret: &str) -> bool {
    let supplied = supplied.as_bytes();
    let secret = secret.as_bytes();
    supplied.len() == secret.len() && bool::from(supplied.ct_eq(secret))
}

//! Webhook message signing and verification.
//!
//! Every request carries `sha256=<hex>` where `<hex>` is the lowercase
//! HMAC-SHA256, keyed by the subscription secret, of
//! `message_id ‖ message_timestamp ‖ raw_body`. The timestamp participates
//! exactly as received; it is never reparsed before hashing.

use crate::types::SIGNATURE_PREFIX;
use hmac::digest::Key;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// The secret as a full-block HMAC key: zero-padded, or hashed first when it
/// is longer than one SHA-256 block.
fn block_key(secret: &[u8]) -> Key<HmacSha256> {
    let mut key = Key::<HmacSha256>::default();
    if secret.len() > key.len() {
        let hashed = Sha256::digest(secret);
        key[..hashed.len()].copy_from_slice(&hashed);
    } else {
        key[..secret.len()].copy_from_slice(secret);
    }
    key
}

fn digest(secret: &[u8], id: &str, timestamp: &str, body: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new(&block_key(secret));
    mac.update(id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.finalize().into_bytes().into()
}

/// Computes the signature header value for a message.
///
/// # Examples
///
/// ```
/// use eventsub_common::crypto;
///
/// let sig = crypto::sign(b"s3cr3t", "abc-123", "2021-07-01T18:30:00Z", b"{}");
/// assert!(sig.starts_with("sha256="));
/// assert_eq!(sig.len(), 7 + 64);
/// ```
#[must_use]
pub fn sign(secret: &[u8], id: &str, timestamp: &str, body: &[u8]) -> String {
    let mut out = String::with_capacity(SIGNATURE_PREFIX.len() + 64);
    out.push_str(SIGNATURE_PREFIX);
    out.push_str(&hex::encode(digest(secret, id, timestamp, body)));
    out
}

/// Checks a declared signature against the one computed over the message.
///
/// The comparison runs in constant time over the full header value, prefix
/// included, so a candidate with the wrong prefix or case never matches.
///
/// # Examples
///
/// ```
/// use eventsub_common::crypto;
///
/// let sig = crypto::sign(b"s3cr3t", "abc-123", "2021-07-01T18:30:00Z", b"{}");
/// assert!(crypto::verify(b"s3cr3t", "abc-123", "2021-07-01T18:30:00Z", b"{}", &sig));
/// assert!(!crypto::verify(b"s3cr3t", "abc-124", "2021-07-01T18:30:00Z", b"{}", &sig));
/// ```
#[must_use]
pub fn verify(secret: &[u8], id: &str, timestamp: &str, body: &[u8], candidate: &str) -> bool {
    let expected = sign(secret, id, timestamp, body);
    let candidate = candidate.as_bytes();
    if expected.len() != candidate.len() {
        return false;
    }
    expected.as_bytes().ct_eq(candidate).into()
}

//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>]`.
//! The signed payload is `"<t>.<raw body>"`, keyed with the endpoint secret.

use std::time::Duration;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Why a signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The header had no `t=` element or it was not an integer.
    #[error("missing or invalid timestamp")]
    MissingTimestamp,

    /// The header had no `v1=` element.
    #[error("no v1 signature")]
    MissingSignature,

    /// The timestamp is outside the tolerance window.
    #[error("timestamp outside tolerance")]
    Expired,

    /// No signature matched the payload.
    #[error("signature mismatch")]
    Mismatch,
}

/// Verify `header` against the raw `payload`.
///
/// `now` is the current Unix time in seconds.
///
/// # Errors
///
/// Returns a [`SignatureError`] describing the first check that failed.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(ts)) => timestamp = Some(ts),
            (Some("v1"), Some(sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MissingTimestamp)?;

    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    if now.abs_diff(ts) > tolerance.as_secs() {
        return Err(SignatureError::Expired);
    }

    let expected = signed_digest(payload, secret, timestamp);
    if signatures
        .iter()
        .any(|sig| constant_time_eq(expected.as_bytes(), sig.as_bytes()))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a header for `payload` the way Stripe does. Used by tests and local
/// tooling that replays events.
#[must_use]
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let signature = signed_digest(payload, secret, &timestamp.to_string());
    format!("t={timestamp},v1={signature}")
}

/// `v1` scheme: HMAC of `"<t>.<payload>"` with the raw timestamp text.
fn signed_digest(payload: &str, secret: &str, timestamp: &str) -> String {
    hmac_sha256_hex(
        secret.as_bytes(),
        &[timestamp.as_bytes(), b".", payload.as_bytes()],
    )
}

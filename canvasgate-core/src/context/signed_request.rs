//! Signed envelope verification.
//!
//! The platform posts a `signed_request` field of the form
//! `base64url(signature) "." base64url(json payload)`, where the signature is
//! HMAC-SHA256 over the encoded payload keyed by the application secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;

use super::model::Claims;
use crate::error::VerificationError;

type HmacSha256 = Hmac<Sha256>;

/// The only algorithm the platform signs envelopes with.
pub const SIGNED_REQUEST_ALGORITHM: &str = "HMAC-SHA256";

/// Decodes and verifies a raw signed envelope into claims.
pub trait SignedRequestVerifier: Send + Sync {
    /// Verify `raw` and return its claims, or fail without side effects.
    fn verify(&self, raw: &str) -> Result<Claims, VerificationError>;
}

/// HMAC-SHA256 verifier keyed by the application secret.
#[derive(Clone)]
pub struct HmacSignedRequestVerifier {
    secret: String,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for HmacSignedRequestVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSignedRequestVerifier")
            .field("secret", &"[REDACTED]")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl HmacSignedRequestVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_age: None,
        }
    }

    /// Reject envelopes whose `issued_at` is older than `max_age`.
    ///
    /// Envelopes without `issued_at` are accepted.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Produce an envelope for `payload`, signed with this verifier's secret.
    pub fn sign(&self, payload: &Value) -> Result<String, VerificationError> {
        let encoded_payload = URL_SAFE_NO_PAD.encode(payload.to_string());
        let signature = self.mac(encoded_payload.as_bytes())?.finalize().into_bytes();
        Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(signature), encoded_payload))
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, VerificationError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| VerificationError::Malformed(format!("unusable secret: {}", e)))?;
        mac.update(data);
        Ok(mac)
    }

    fn check_age(&self, claims: &Claims) -> Result<(), VerificationError> {
        let (Some(max_age), Some(issued_at)) = (self.max_age, claims.issued_at()) else {
            return Ok(());
        };
        let age_secs = Utc::now().timestamp() - issued_at;
        if age_secs > max_age.as_secs() as i64 {
            return Err(VerificationError::Expired { age_secs });
        }
        Ok(())
    }
}

impl SignedRequestVerifier for HmacSignedRequestVerifier {
    fn verify(&self, raw: &str) -> Result<Claims, VerificationError> {
        let (encoded_sig, encoded_payload) = raw
            .trim()
            .split_once('.')
            .ok_or_else(|| VerificationError::Malformed("missing '.' separator".into()))?;

        if encoded_sig.is_empty() || encoded_payload.is_empty() {
            return Err(VerificationError::Malformed("empty segment".into()));
        }

        let signature = decode_segment(encoded_sig)?;
        let payload = decode_segment(encoded_payload)?;

        let value: Value = serde_json::from_slice(&payload)
            .map_err(|e| VerificationError::Payload(e.to_string()))?;
        let claims = Claims::try_from(value)?;

        match claims.algorithm() {
            Some(algorithm) if algorithm.eq_ignore_ascii_case(SIGNED_REQUEST_ALGORITHM) => {}
            Some(other) => return Err(VerificationError::UnsupportedAlgorithm(other.to_string())),
            None => return Err(VerificationError::UnsupportedAlgorithm("none".into())),
        }

        self.mac(encoded_payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| VerificationError::SignatureMismatch)?;

        self.check_age(&claims)?;

        Ok(claims)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, VerificationError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| VerificationError::Encoding(e.to_string()))
}
